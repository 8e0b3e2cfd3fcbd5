//! kubetab schema: the table catalog for a connection.
//!
//! Built-in tables are registered first, then one table per discovered CRD,
//! then the cross-CRD `kubernetes_crd_resource` table. A name registered
//! earlier is never replaced.

#![forbid(unsafe_code)]

pub mod builtin;
pub mod crd;
pub mod synth;

use kubetab_kubehub::{ClientFactory, Result, TableMap};
use tracing::info;

pub use builtin::builtin_tables;
pub use crd::{descriptor_from_crd, list_crds, CrdDescriptor};
pub use synth::{crd_resource_table, snake_case, spec_columns, synthesize, CrdTableParams, CRD_RESOURCE_TABLE};

/// Assemble the table map from already discovered CRDs.
pub fn assemble(descriptors: &[CrdDescriptor]) -> TableMap {
    let mut tables = builtin_tables();
    tables.insert_if_absent(crd_resource_table(descriptors));
    let synthesized = synthesize(descriptors, &tables);
    tables.extend(synthesized.into_values());
    tables
}

/// Discover CRDs and build every table for this connection. A discovery
/// failure fails the whole call.
pub async fn table_definitions(clients: &ClientFactory) -> Result<TableMap> {
    let crds = list_crds(clients).await?;
    let tables = assemble(&crds);
    info!(tables = tables.len(), crds = crds.len(), "table map ready");
    Ok(tables)
}
