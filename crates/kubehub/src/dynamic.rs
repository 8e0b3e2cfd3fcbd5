//! Schema-less listing of any group/version/resource.

use std::ops::ControlFlow;
use std::sync::Arc;

use kube::api::{ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kubetab_core::envelope::ResourceEnvelope;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::DynamicClient;
use crate::error::Result;
use crate::paginate::{paginate, ListOutcome, ListPlan, PageSource};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvr {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl Gvr {
    pub fn new(group: impl Into<String>, version: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), resource: resource.into() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    pub fn api_resource(&self, kind: &str) -> ApiResource {
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(&self.group, &self.version, kind), &self.resource)
    }
}

impl std::fmt::Display for Gvr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Convert a listed object into an envelope, filling `apiVersion` and `kind`
/// from the API resource when the server left them out. `None` means the
/// object lacks an identity field and was skipped.
pub fn envelope_of(obj: &DynamicObject, ar: &ApiResource) -> Result<Option<ResourceEnvelope>> {
    let mut raw = serde_json::to_value(obj)?;
    if let Value::Object(map) = &mut raw {
        map.entry("apiVersion").or_insert_with(|| Value::String(ar.api_version.clone()));
        map.entry("kind").or_insert_with(|| Value::String(ar.kind.clone()));
    }
    match ResourceEnvelope::from_object(&raw) {
        Ok(env) => Ok(Some(env)),
        Err(e) => {
            warn!(kind = %ar.kind, error = %e, "skipping malformed object");
            Ok(None)
        }
    }
}

#[derive(Clone)]
pub struct DynamicLister {
    client: Arc<DynamicClient>,
    gvr: Gvr,
    ar: ApiResource,
}

impl DynamicLister {
    pub fn new(client: Arc<DynamicClient>, gvr: Gvr, kind: &str) -> Self {
        let ar = gvr.api_resource(kind);
        Self { client, gvr, ar }
    }

    pub fn gvr(&self) -> &Gvr {
        &self.gvr
    }

    /// List every object of the resource across namespaces. Returning
    /// [`ControlFlow::Break`] from `emit` ends the listing successfully.
    pub async fn list<F>(&self, plan: &ListPlan, cancel: &CancellationToken, emit: F) -> Result<ListOutcome>
    where
        F: FnMut(ResourceEnvelope) -> ControlFlow<()> + Send,
    {
        let api = self.client.resource(&self.ar, None);
        debug!(gvr = %self.gvr, selector = ?plan.field_selector, limit = ?plan.limit, "dynamic list");
        list_envelopes(&api, &self.ar, plan, cancel, emit).await
    }

    /// Fetch one object. A 404 is `Ok(None)`.
    pub async fn get(&self, name: &str, namespace: Option<&str>) -> Result<Option<ResourceEnvelope>> {
        let api = self.client.resource(&self.ar, namespace);
        // get_opt turns the server's 404 into None; other statuses stay errors.
        match api.get_opt(name).await? {
            Some(obj) => envelope_of(&obj, &self.ar),
            None => Ok(None),
        }
    }
}

/// Paginate `source`, turning each object into an envelope for `ar`.
pub async fn list_envelopes<S, F>(
    source: &S,
    ar: &ApiResource,
    plan: &ListPlan,
    cancel: &CancellationToken,
    mut emit: F,
) -> Result<ListOutcome>
where
    S: PageSource<Item = DynamicObject> + ?Sized,
    F: FnMut(ResourceEnvelope) -> ControlFlow<()> + Send,
{
    paginate(source, plan, cancel, |obj| match envelope_of(&obj, ar) {
        Ok(Some(env)) => emit(env),
        Ok(None) => ControlFlow::Continue(()),
        Err(e) => {
            warn!(kind = %ar.kind, error = %e, "object could not be serialized");
            ControlFlow::Continue(())
        }
    })
    .await
}
