//! Column model and row shaping.
//!
//! This module provides:
//! - Column types mirroring the storage types a host engine understands
//! - Column sources (JSON pointers, tag merges, connection context)
//! - The common column sets shared by built-in and CRD-derived tables
//! - `build_row`, which projects a raw object through a column list

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int,
    Double,
    Bool,
    Json,
    Timestamp,
}

impl ColumnType {
    /// Map an OpenAPI scalar `type` to a column type. Composite and unknown
    /// types return `None`; callers keep those as opaque JSON.
    pub fn from_openapi(ty: &str) -> Option<Self> {
        match ty {
            "string" => Some(Self::String),
            "integer" => Some(Self::Int),
            "number" => Some(Self::Double),
            "boolean" => Some(Self::Bool),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Json => "json",
            Self::Timestamp => "timestamp",
        }
    }

    /// Coerce a raw value into this column type. Mismatched scalars become null.
    pub fn coerce(self, v: Option<&Value>) -> Value {
        let Some(v) = v.filter(|v| !v.is_null()) else { return Value::Null };
        match self {
            Self::String => v.as_str().map(|s| Value::String(s.to_string())).unwrap_or(Value::Null),
            Self::Int => v.as_i64().map(Value::from).unwrap_or(Value::Null),
            Self::Double => v.as_f64().map(Value::from).unwrap_or(Value::Null),
            Self::Bool => v.as_bool().map(Value::Bool).unwrap_or(Value::Null),
            Self::Json => v.clone(),
            Self::Timestamp => v
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Value::String(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true)))
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSource {
    /// RFC 6901 pointer into the object, e.g. `/spec/schedule`.
    Pointer(String),
    /// Union of two string maps; entries of the second win.
    Merge(String, String),
    /// Name of the kubeconfig context the row was read through.
    ContextName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub description: String,
    pub source: ColumnSource,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, pointer: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), column_type, description: description.into(), source: ColumnSource::Pointer(pointer.into()) }
    }

    pub fn computed(name: impl Into<String>, column_type: ColumnType, source: ColumnSource, description: impl Into<String>) -> Self {
        Self { name: name.into(), column_type, description: description.into(), source }
    }

    pub fn extract(&self, obj: &Value, ctx: &RowContext) -> Value {
        match &self.source {
            ColumnSource::Pointer(p) => self.column_type.coerce(obj.pointer(p)),
            ColumnSource::Merge(a, b) => {
                let tags = merge_tags(&string_map_at(obj, b), &string_map_at(obj, a));
                serde_json::to_value(tags).unwrap_or(Value::Null)
            }
            ColumnSource::ContextName => ctx.context_name.clone().map(Value::String).unwrap_or(Value::Null),
        }
    }
}

/// Per-query values that do not come from the object itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowContext {
    pub context_name: Option<String>,
}

/// Project `obj` through `columns`. Every column is present in the row.
pub fn build_row(columns: &[Column], obj: &Value, ctx: &RowContext) -> Row {
    let mut row = Row::new();
    for c in columns {
        row.insert(c.name.clone(), c.extract(obj, ctx));
    }
    row
}

/// Build a JSON pointer from raw keys, escaping `~` and `/`.
pub fn pointer_for(keys: &[&str]) -> String {
    let mut out = String::new();
    for k in keys {
        out.push('/');
        out.push_str(&k.replace('~', "~0").replace('/', "~1"));
    }
    out
}

/// Merge annotations and labels into one tag map; labels win on conflict.
pub fn merge_tags(labels: &BTreeMap<String, String>, annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut tags = annotations.clone();
    for (k, v) in labels {
        tags.insert(k.clone(), v.clone());
    }
    tags
}

fn string_map_at(obj: &Value, pointer: &str) -> BTreeMap<String, String> {
    obj.pointer(pointer)
        .and_then(Value::as_object)
        .map(|m| m.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

pub const DESC_TITLE: &str = "Title of the resource.";
pub const DESC_TAGS: &str = "A map of tags for the resource. This includes both labels and annotations.";
pub const DESC_CONTEXT: &str = "Kubectl config context name.";

/// Common columns for objects shaped like a full Kubernetes object (`metadata.*`).
pub fn object_common_columns() -> Vec<Column> {
    use ColumnType::*;
    vec![
        Column::new("name", String, "/metadata/name", "Name of the object. Name must be unique within a namespace."),
        Column::new("namespace", String, "/metadata/namespace", "Namespace defines the space within which each name must be unique."),
        Column::new("uid", String, "/metadata/uid", "UID is the unique in time and space value for this object."),
        Column::new("generate_name", String, "/metadata/generateName", "GenerateName is an optional prefix, used by the server, to generate a unique name."),
        Column::new("resource_version", String, "/metadata/resourceVersion", "An opaque value that represents the internal version of this object."),
        Column::new("generation", Int, "/metadata/generation", "A sequence number representing a specific generation of the desired state."),
        Column::new("creation_timestamp", Timestamp, "/metadata/creationTimestamp", "Time when this object was created."),
        Column::new("deletion_timestamp", Timestamp, "/metadata/deletionTimestamp", "RFC 3339 date and time at which this resource will be deleted."),
        Column::new("deletion_grace_period_seconds", Int, "/metadata/deletionGracePeriodSeconds", "Seconds allowed for this object to gracefully terminate."),
        Column::new("labels", Json, "/metadata/labels", "Map of string keys and values used to organize and categorize objects."),
        Column::new("annotations", Json, "/metadata/annotations", "Unstructured key value map stored with a resource."),
        Column::new("owner_references", Json, "/metadata/ownerReferences", "List of objects depended by this object."),
        Column::new("finalizers", Json, "/metadata/finalizers", "Must be empty before the object is deleted from the registry."),
        Column::computed("context_name", String, ColumnSource::ContextName, DESC_CONTEXT),
        Column::new("title", String, "/metadata/name", DESC_TITLE),
        Column::computed("tags", Json, ColumnSource::Merge("/metadata/annotations".into(), "/metadata/labels".into()), DESC_TAGS),
    ]
}

/// Common columns for rows built from a serialized [`crate::envelope::ResourceEnvelope`].
pub fn envelope_common_columns() -> Vec<Column> {
    use ColumnType::*;
    vec![
        Column::new("name", String, "/name", "Name of the object."),
        Column::new("namespace", String, "/namespace", "Namespace of the object; null for cluster-scoped kinds."),
        Column::new("kind", String, "/kind", "Kind of the custom resource."),
        Column::new("api_version", String, "/apiVersion", "Group and version of the custom resource."),
        Column::new("labels", Json, "/labels", "Map of string keys and values used to organize and categorize objects."),
        Column::new("annotations", Json, "/annotations", "All annotations of the object."),
        Column::new("last_applied_configuration", String, "/lastAppliedConfiguration", "Configuration recorded by kubectl apply, if any."),
        Column::new("spec", Json, "/spec", "Spec of the custom resource, verbatim."),
        Column::computed("context_name", String, ColumnSource::ContextName, DESC_CONTEXT),
        Column::new("title", String, "/name", DESC_TITLE),
        Column::computed("tags", Json, ColumnSource::Merge("/annotations".into(), "/labels".into()), DESC_TAGS),
    ]
}
