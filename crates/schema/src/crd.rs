//! CRD discovery: list the cluster's CustomResourceDefinitions and reduce each
//! to what table synthesis needs.

use std::ops::ControlFlow;

use kubetab_core::value::{self, FieldError};
use kubetab_kubehub::{paginate, ClientFactory, ListPlan, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdDescriptor {
    /// `<plural>.<group>`, also the synthesized table name.
    pub name: String,
    pub group: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
    /// First version flagged `served`, in declared order.
    pub served_version: Option<String>,
    /// Version used for list calls: the served one, else the first declared.
    pub list_version: String,
    /// OpenAPI schema of `spec` for the served version.
    pub spec_schema: Option<Value>,
    pub description: Option<String>,
}

/// Pick (served, list) versions from a CRD's `spec.versions`.
pub fn select_versions(versions: &[Value]) -> Option<(Option<String>, String)> {
    let first = versions.iter().find_map(|v| value::optional_str(v, &["name"]))?;
    let served = versions
        .iter()
        .find(|v| value::optional_bool(v, &["served"]).unwrap_or(false))
        .and_then(|v| value::optional_str(v, &["name"]))
        .map(str::to_string);
    let list = served.clone().unwrap_or_else(|| first.to_string());
    Some((served, list))
}

/// Build a descriptor from a CRD serialized to JSON. `Ok(None)` when the CRD
/// declares no versions at all.
pub fn descriptor_from_crd(crd: &Value) -> std::result::Result<Option<CrdDescriptor>, FieldError> {
    let name = value::required_str(crd, &["metadata", "name"])?.to_string();
    let group = value::required_str(crd, &["spec", "group"])?.to_string();
    let kind = value::required_str(crd, &["spec", "names", "kind"])?.to_string();
    let plural = value::required_str(crd, &["spec", "names", "plural"])?.to_string();
    let namespaced = value::optional_str(crd, &["spec", "scope"]) != Some("Cluster");

    let versions = value::lookup(crd, &["spec", "versions"]).and_then(Value::as_array).cloned().unwrap_or_default();
    let Some((served_version, list_version)) = select_versions(&versions) else {
        return Ok(None);
    };
    let root_schema = served_version.as_deref().and_then(|sv| {
        versions
            .iter()
            .find(|v| value::optional_str(v, &["name"]) == Some(sv))
            .and_then(|v| value::lookup(v, &["schema", "openAPIV3Schema"]))
    });
    let spec_schema = root_schema.and_then(|s| value::lookup(s, &["properties", "spec"])).cloned();
    let description = root_schema.and_then(|s| value::optional_str(s, &["description"])).map(str::to_string);

    Ok(Some(CrdDescriptor { name, group, kind, plural, namespaced, served_version, list_version, spec_schema, description }))
}

/// List every CRD in the cluster. Any request error aborts discovery; no
/// partial result is returned.
pub async fn list_crds(clients: &ClientFactory) -> Result<Vec<CrdDescriptor>> {
    let api = clients.crd().await?.crds();
    let mut out = Vec::new();
    let outcome = paginate(&api, &ListPlan::new(), &CancellationToken::new(), |crd| {
        let raw = match serde_json::to_value(&crd) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "CRD could not be serialized");
                return ControlFlow::Continue(());
            }
        };
        match descriptor_from_crd(&raw) {
            Ok(Some(d)) => {
                debug!(crd = %d.name, served = ?d.served_version, list = %d.list_version, "CRD discovered");
                out.push(d);
            }
            Ok(None) => warn!(crd = ?value::optional_str(&raw, &["metadata", "name"]), "CRD declares no versions, skipping"),
            Err(e) => warn!(error = %e, "malformed CRD, skipping"),
        }
        ControlFlow::Continue(())
    })
    .await?;
    counter!("kubetab_crds_discovered_total", out.len() as u64);
    info!(crds = out.len(), pages = outcome.pages, "CRD discovery complete");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crd_json(versions: Value) -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "widgets.example.com" },
            "spec": {
                "group": "example.com",
                "scope": "Namespaced",
                "names": { "kind": "Widget", "plural": "widgets" },
                "versions": versions
            }
        })
    }

    #[test]
    fn first_served_version_wins() {
        let crd = crd_json(json!([
            { "name": "v1alpha1", "served": false, "storage": false },
            { "name": "v1beta1", "served": true, "storage": false,
              "schema": { "openAPIV3Schema": { "description": "A widget.",
                "properties": { "spec": { "type": "object", "properties": { "size": { "type": "integer" } } } } } } },
            { "name": "v1", "served": true, "storage": true }
        ]));
        let d = descriptor_from_crd(&crd).unwrap().unwrap();
        assert_eq!(d.served_version.as_deref(), Some("v1beta1"));
        assert_eq!(d.list_version, "v1beta1");
        assert!(d.namespaced);
        assert_eq!(d.description.as_deref(), Some("A widget."));
        assert_eq!(d.spec_schema.unwrap()["properties"]["size"]["type"], "integer");
    }

    #[test]
    fn unserved_crd_lists_first_declared_version_without_schema() {
        let crd = crd_json(json!([
            { "name": "v2", "served": false, "schema": { "openAPIV3Schema": { "properties": { "spec": {} } } } },
            { "name": "v3", "served": false }
        ]));
        let d = descriptor_from_crd(&crd).unwrap().unwrap();
        assert_eq!(d.served_version, None);
        assert_eq!(d.list_version, "v2");
        assert_eq!(d.spec_schema, None);
    }

    #[test]
    fn versionless_and_malformed_crds() {
        assert_eq!(descriptor_from_crd(&crd_json(json!([]))).unwrap(), None);
        let mut crd = crd_json(json!([{ "name": "v1", "served": true }]));
        crd["spec"]["names"] = json!({ "kind": "Widget" });
        assert!(matches!(descriptor_from_crd(&crd), Err(FieldError::Missing(_))));
    }

    #[test]
    fn cluster_scope_is_detected() {
        let mut crd = crd_json(json!([{ "name": "v1", "served": true }]));
        crd["spec"]["scope"] = json!("Cluster");
        assert!(!descriptor_from_crd(&crd).unwrap().unwrap().namespaced);
    }
}
