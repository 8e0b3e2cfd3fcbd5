//! Uniform envelope extracted from arbitrary-kind objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{self, FieldError};

pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEnvelope {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Value of the kubectl last-applied annotation, trimmed of surrounding quotes.
    pub last_applied_configuration: Option<String>,
    pub spec: Option<Value>,
}

impl ResourceEnvelope {
    /// Extract an envelope from a raw object. Only `kind`, `apiVersion` and
    /// `metadata.name` are required.
    pub fn from_object(obj: &Value) -> Result<Self, FieldError> {
        let kind = value::required_str(obj, &["kind"])?.to_string();
        let api_version = value::required_str(obj, &["apiVersion"])?.to_string();
        let name = value::required_str(obj, &["metadata", "name"])?.to_string();
        let namespace = value::optional_str(obj, &["metadata", "namespace"]).map(str::to_string);
        let labels = value::string_map(obj, &["metadata", "labels"]);
        let annotations = value::string_map(obj, &["metadata", "annotations"]);
        let last_applied_configuration = annotations
            .get(LAST_APPLIED_ANNOTATION)
            .map(|s| s.trim_matches('"').to_string());
        let spec = value::lookup(obj, &["spec"]).cloned();
        Ok(Self { kind, api_version, name, namespace, labels, annotations, last_applied_configuration, spec })
    }

    /// Serialized form used as the row source for envelope-shaped tables.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_full_envelope() {
        let obj = json!({
            "kind": "Certificate",
            "apiVersion": "cert-manager.io/v1",
            "metadata": {
                "name": "web-tls",
                "namespace": "prod",
                "labels": { "team": "edge" },
                "annotations": {
                    LAST_APPLIED_ANNOTATION: "\"{\\\"kind\\\":\\\"Certificate\\\"}\"",
                    "owner": "ops"
                }
            },
            "spec": { "secretName": "web-tls", "dnsNames": ["a.example.com"] }
        });
        let env = ResourceEnvelope::from_object(&obj).unwrap();
        assert_eq!(env.kind, "Certificate");
        assert_eq!(env.namespace.as_deref(), Some("prod"));
        assert_eq!(env.annotations.len(), 2);
        assert_eq!(env.last_applied_configuration.as_deref(), Some("{\\\"kind\\\":\\\"Certificate\\\"}"));
        assert_eq!(env.spec.as_ref().and_then(|s| s.get("secretName")), Some(&json!("web-tls")));
    }

    #[test]
    fn optional_fields_degrade_to_absent() {
        let obj = json!({
            "kind": "ClusterIssuer",
            "apiVersion": "cert-manager.io/v1",
            "metadata": { "name": "letsencrypt", "annotations": { "n": 1 } }
        });
        let env = ResourceEnvelope::from_object(&obj).unwrap();
        assert!(env.namespace.is_none());
        assert!(env.annotations.is_empty());
        assert!(env.last_applied_configuration.is_none());
        assert!(env.spec.is_none());
        let v = env.to_value();
        assert_eq!(v["name"], json!("letsencrypt"));
        assert_eq!(v["apiVersion"], json!("cert-manager.io/v1"));
    }

    #[test]
    fn missing_name_is_an_error() {
        let obj = json!({ "kind": "Widget", "apiVersion": "example.com/v1", "metadata": {} });
        assert_eq!(
            ResourceEnvelope::from_object(&obj),
            Err(FieldError::Missing("metadata.name".into()))
        );
    }
}
