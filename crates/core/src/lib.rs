//! kubetab core types: rows, columns, resource envelopes and row sinks.
//!
//! Nothing in this crate talks to a cluster; it only shapes loosely-typed
//! Kubernetes objects into table rows.

#![forbid(unsafe_code)]

pub mod columns;
pub mod envelope;
pub mod quals;
pub mod sink;
pub mod value;

/// A single table row: column name -> JSON value (null when absent).
pub type Row = serde_json::Map<String, serde_json::Value>;

pub mod prelude {
    pub use super::columns::{build_row, Column, ColumnSource, ColumnType, RowContext};
    pub use super::envelope::ResourceEnvelope;
    pub use super::quals::KeyQuals;
    pub use super::sink::{FnSink, RowBudget, RowSink, VecSink};
    pub use super::Row;
}
