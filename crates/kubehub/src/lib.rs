//! kubetab kubehub: cluster clients, pagination and listing wiring.
//!
//! - [`cache::SessionCache`]: connection-scoped acquire-or-create store
//! - [`client::ClientFactory`]: kubeconfig resolution and the three client flavors
//! - [`paginate`]: the continuation-token loop every lister shares
//! - [`dynamic::DynamicLister`]: schema-less listing of any group/version/resource
//! - [`table`]: table definitions and the hydration seam the host calls into

#![forbid(unsafe_code)]

pub mod cache;
pub mod client;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod paginate;
pub mod table;
pub mod typed;

pub use cache::SessionCache;
pub use client::{ClientFactory, ClientFlavor, ClientHandle, ConfigLoader, CrdClient, DynamicClient, KubeconfigLoader, TypedClient};
pub use config::{ConnectionConfig, RestConfig};
pub use dynamic::{list_envelopes, DynamicLister, Gvr};
pub use error::{Error, Result};
pub use paginate::{paginate, ListOutcome, ListPlan, Page, PageSource, StopReason, PAGE_SIZE};
pub use table::{GetKeys, QueryContext, TableDefinition, TableMap, TableSource};
