//! Equality filters supplied by the host, and their field-selector rendering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyQuals {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

impl KeyQuals {
    pub fn new(name: Option<String>, namespace: Option<String>) -> Self {
        Self { name, namespace }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|s| !s.is_empty())
    }

    /// Individual selector clauses, name first.
    pub fn field_selectors(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(name) = self.name() {
            out.push(format!("metadata.name={}", name));
        }
        if let Some(ns) = self.namespace() {
            out.push(format!("metadata.namespace={}", ns));
        }
        out
    }

    /// Comma-joined selector, or `None` when no filter is set.
    pub fn field_selector(&self) -> Option<String> {
        let clauses = self.field_selectors();
        if clauses.is_empty() { None } else { Some(clauses.join(",")) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_name_before_namespace() {
        let q = KeyQuals::new(Some("foo".into()), Some("bar".into()));
        assert_eq!(q.field_selector().as_deref(), Some("metadata.name=foo,metadata.namespace=bar"));
    }

    #[test]
    fn absent_and_empty_filters_render_nothing() {
        assert_eq!(KeyQuals::default().field_selector(), None);
        let q = KeyQuals::new(Some(String::new()), Some("kube-system".into()));
        assert_eq!(q.field_selector().as_deref(), Some("metadata.namespace=kube-system"));
    }
}
