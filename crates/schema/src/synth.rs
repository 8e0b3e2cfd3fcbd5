//! Table synthesis for discovered CRDs.
//!
//! Every CRD becomes one table named after the CRD. Columns are the envelope
//! common columns followed by one column per top-level property of the
//! served version's `spec` schema. Scalars keep their type; objects, arrays
//! and untyped or int-or-string properties become opaque JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kubetab_core::columns::{envelope_common_columns, pointer_for, Column, ColumnType};
use kubetab_kubehub::{
    list_envelopes, ClientFactory, DynamicLister, GetKeys, Gvr, ListOutcome, ListPlan, PageSource, Result, StopReason, TableDefinition,
    TableMap, TableSource,
};
use metrics::counter;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crd::CrdDescriptor;

pub const CRD_RESOURCE_TABLE: &str = "kubernetes_crd_resource";

/// Everything a synthesized table needs to reach its resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CrdTableParams {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub kind: String,
    pub namespaced: bool,
    pub schema: Option<Value>,
}

impl CrdTableParams {
    pub fn gvr(&self) -> Gvr {
        Gvr::new(&self.group, &self.version, &self.plural)
    }

    pub fn api_resource(&self) -> ApiResource {
        self.gvr().api_resource(&self.kind)
    }

    /// Namespace to address on get; cluster-scoped resources ignore it.
    pub fn get_namespace<'a>(&self, namespace: Option<&'a str>) -> Option<&'a str> {
        if self.namespaced { namespace } else { None }
    }
}

impl From<&CrdDescriptor> for CrdTableParams {
    fn from(d: &CrdDescriptor) -> Self {
        Self {
            group: d.group.clone(),
            version: d.list_version.clone(),
            plural: d.plural.clone(),
            kind: d.kind.clone(),
            namespaced: d.namespaced,
            // Without a served version the shape is unknown.
            schema: d.served_version.as_ref().and(d.spec_schema.clone()),
        }
    }
}

/// `podIP` -> `pod_ip`, `URLPath` -> `url_path`, `x-foo` -> `x_foo`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.map(|n| n.is_ascii_lowercase()).unwrap_or(false),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn column_type_of(prop: &Value) -> ColumnType {
    if prop.get("x-kubernetes-int-or-string").and_then(Value::as_bool).unwrap_or(false) {
        return ColumnType::Json;
    }
    prop.get("type").and_then(Value::as_str).and_then(ColumnType::from_openapi).unwrap_or(ColumnType::Json)
}

/// One column per property of the `spec` schema. Names colliding with a
/// common column get a `spec_` prefix; later properties that still collide
/// are dropped.
pub fn spec_columns(schema: Option<&Value>, common: &[Column]) -> Vec<Column> {
    let Some(props) = schema.and_then(|s| s.get("properties")).and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut taken: BTreeSet<String> = common.iter().map(|c| c.name.clone()).collect();
    let mut out = Vec::with_capacity(props.len());
    for (prop, sub) in props {
        let mut name = snake_case(prop);
        if name.is_empty() {
            continue;
        }
        if taken.contains(&name) {
            name = format!("spec_{}", name);
        }
        if !taken.insert(name.clone()) {
            warn!(property = %prop, column = %name, "duplicate column after normalization, dropping");
            continue;
        }
        let description = sub.get("description").and_then(Value::as_str).unwrap_or_default();
        out.push(Column::new(name, column_type_of(sub), pointer_for(&["spec", prop]), description));
    }
    out
}

/// Lists one custom resource through the dynamic client.
pub struct CrdResourceSource {
    params: CrdTableParams,
}

impl CrdResourceSource {
    pub fn new(params: CrdTableParams) -> Self {
        Self { params }
    }

    async fn lister(&self, clients: &ClientFactory) -> Result<DynamicLister> {
        Ok(DynamicLister::new(clients.dynamic().await?, self.params.gvr(), &self.params.kind))
    }
}

#[async_trait]
impl TableSource for CrdResourceSource {
    async fn list(
        &self,
        clients: &ClientFactory,
        plan: &ListPlan,
        cancel: &CancellationToken,
        emit: &mut (dyn FnMut(Value) -> ControlFlow<()> + Send),
    ) -> Result<ListOutcome> {
        self.lister(clients).await?.list(plan, cancel, |env| emit(env.to_value())).await
    }

    async fn get(&self, clients: &ClientFactory, name: &str, namespace: Option<&str>) -> Result<Option<Value>> {
        let ns = self.params.get_namespace(namespace);
        Ok(self.lister(clients).await?.get(name, ns).await?.map(|env| env.to_value()))
    }

    fn get_keys(&self) -> Option<GetKeys> {
        Some(if self.params.namespaced { GetKeys::NameAndNamespace } else { GetKeys::Name })
    }
}

fn crd_table(d: &CrdDescriptor) -> TableDefinition {
    let params = CrdTableParams::from(d);
    let mut columns = envelope_common_columns();
    let extra = spec_columns(params.schema.as_ref(), &columns);
    columns.extend(extra);
    let description = d.description.clone().unwrap_or_else(|| format!("Custom resource {} from {}.", d.kind, d.group));
    TableDefinition::new(d.name.clone(), description, columns, Arc::new(CrdResourceSource::new(params)))
}

/// Build tables for `descriptors`, skipping any name already in `existing`.
/// When two descriptors share a name the first one is kept.
pub fn synthesize(descriptors: &[CrdDescriptor], existing: &TableMap) -> BTreeMap<String, TableDefinition> {
    let mut out = BTreeMap::new();
    for d in descriptors {
        if existing.contains(&d.name) {
            debug!(crd = %d.name, "table name already registered, keeping existing");
            continue;
        }
        if out.contains_key(&d.name) {
            warn!(crd = %d.name, "duplicate CRD name, keeping first");
            continue;
        }
        out.insert(d.name.clone(), crd_table(d));
    }
    counter!("kubetab_tables_synthesized_total", out.len() as u64);
    info!(tables = out.len(), "CRD tables synthesized");
    out
}

/// Lists instances of every discovered CRD in one table. The row budget is
/// shared across CRDs.
pub struct AllCustomResourcesSource {
    crds: Vec<CrdTableParams>,
}

impl AllCustomResourcesSource {
    pub fn new(crds: Vec<CrdTableParams>) -> Self {
        Self { crds }
    }
}

#[async_trait]
impl TableSource for AllCustomResourcesSource {
    async fn list(
        &self,
        clients: &ClientFactory,
        plan: &ListPlan,
        cancel: &CancellationToken,
        emit: &mut (dyn FnMut(Value) -> ControlFlow<()> + Send),
    ) -> Result<ListOutcome> {
        let client = clients.dynamic().await?;
        let sources: Vec<_> = self
            .crds
            .iter()
            .map(|params| {
                let ar = params.api_resource();
                (client.resource(&ar, None), ar)
            })
            .collect();
        list_in_turn(&sources, plan, cancel, emit).await
    }
}

/// List each resource in turn against one row budget. Each listing asks for
/// what is left of `plan.limit`; the walk ends at the first listing that
/// stops for any reason other than running out of pages.
pub async fn list_in_turn<S>(
    sources: &[(S, ApiResource)],
    plan: &ListPlan,
    cancel: &CancellationToken,
    emit: &mut (dyn FnMut(Value) -> ControlFlow<()> + Send),
) -> Result<ListOutcome>
where
    S: PageSource<Item = DynamicObject>,
{
    let mut total = ListOutcome::empty(StopReason::Exhausted);
    let mut emitted = 0u64;
    for (source, ar) in sources {
        let mut crd_plan = plan.clone();
        crd_plan.limit = plan.limit.map(|l| l.saturating_sub(emitted));
        let outcome = list_envelopes(source, ar, &crd_plan, cancel, |env| {
            emitted += 1;
            emit(env.to_value())
        })
        .await?;
        debug!(kind = %ar.kind, items = outcome.items, stop = ?outcome.stop, "custom resources listed");
        total.absorb(outcome);
        if outcome.stop != StopReason::Exhausted {
            break;
        }
    }
    Ok(total)
}

pub fn crd_resource_table(descriptors: &[CrdDescriptor]) -> TableDefinition {
    let crds = descriptors.iter().map(CrdTableParams::from).collect();
    TableDefinition::new(
        CRD_RESOURCE_TABLE,
        "Instances of every custom resource in the cluster.",
        envelope_common_columns(),
        Arc::new(AllCustomResourcesSource::new(crds)),
    )
}
