//! Table definitions: a name, its columns, and the source that hydrates rows.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kubetab_core::columns::{build_row, Column, RowContext};
use kubetab_core::quals::KeyQuals;
use kubetab_core::sink::RowSink;
use kubetab_core::Row;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::ClientFactory;
use crate::error::Result;
use crate::paginate::{ListOutcome, ListPlan, StopReason};

/// Keys a table needs to fetch a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetKeys {
    Name,
    NameAndNamespace,
}

/// One query from the host: filters, row budget and cancellation.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub quals: KeyQuals,
    pub limit: Option<u64>,
    pub cancel: CancellationToken,
}

impl QueryContext {
    pub fn new(quals: KeyQuals, limit: Option<u64>) -> Self {
        Self { quals, limit, cancel: CancellationToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn list_plan(&self) -> ListPlan {
        ListPlan::new().with_limit(self.limit).with_field_selector(self.quals.field_selector())
    }
}

/// Produces raw objects for a table. Rows are built from them by the table's
/// columns.
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn list(
        &self,
        clients: &ClientFactory,
        plan: &ListPlan,
        cancel: &CancellationToken,
        emit: &mut (dyn FnMut(Value) -> ControlFlow<()> + Send),
    ) -> Result<ListOutcome>;

    /// Fetch one object; absent is `Ok(None)`. List-only sources keep the default.
    async fn get(&self, _clients: &ClientFactory, _name: &str, _namespace: Option<&str>) -> Result<Option<Value>> {
        Ok(None)
    }

    /// `None` for list-only tables.
    fn get_keys(&self) -> Option<GetKeys> {
        None
    }
}

#[derive(Clone)]
pub struct TableDefinition {
    pub name: String,
    pub description: String,
    pub columns: Vec<Column>,
    pub source: Arc<dyn TableSource>,
}

impl std::fmt::Debug for TableDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableDefinition")
            .field("name", &self.name)
            .field("columns", &self.columns.len())
            .field("get_keys", &self.source.get_keys())
            .finish()
    }
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, columns: Vec<Column>, source: Arc<dyn TableSource>) -> Self {
        Self { name: name.into(), description: description.into(), columns, source }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn get_keys(&self) -> Option<GetKeys> {
        self.source.get_keys()
    }

    /// Stream rows into `sink` until the listing ends, the sink's budget is
    /// spent, or the query is cancelled.
    pub async fn list(&self, clients: &ClientFactory, query: &QueryContext, sink: &mut dyn RowSink) -> Result<ListOutcome> {
        if sink.is_exhausted() {
            return Ok(ListOutcome::empty(StopReason::BudgetReached));
        }
        let ctx = RowContext { context_name: clients.context_name().await? };
        let mut plan = query.list_plan();
        plan.limit = match (plan.limit, sink.rows_remaining()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if plan.limit == Some(0) {
            return Ok(ListOutcome::empty(StopReason::BudgetReached));
        }
        let started = Instant::now();
        let columns = &self.columns;
        let mut rows = 0u64;
        let mut emit = |obj: Value| {
            sink.emit(build_row(columns, &obj, &ctx));
            rows += 1;
            let spent = plan.limit.map(|l| rows >= l).unwrap_or(false);
            if spent || sink.is_exhausted() { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        };
        let outcome = self.source.list(clients, &plan, &query.cancel, &mut emit).await?;
        counter!("kubetab_rows_emitted_total", rows, "table" => self.name.clone());
        histogram!("kubetab_table_list_ms", started.elapsed().as_secs_f64() * 1000.0, "table" => self.name.clone());
        info!(table = %self.name, rows, pages = outcome.pages, stop = ?outcome.stop, "table listed");
        Ok(outcome)
    }

    /// Fetch a single row by key. A missing required key yields no row.
    pub async fn get(&self, clients: &ClientFactory, quals: &KeyQuals) -> Result<Option<Row>> {
        let Some(keys) = self.get_keys() else {
            debug!(table = %self.name, "table is list-only");
            return Ok(None);
        };
        let Some(name) = quals.name() else {
            return Ok(None);
        };
        let namespace = quals.namespace();
        if keys == GetKeys::NameAndNamespace && namespace.is_none() {
            debug!(table = %self.name, name, "namespace key missing, no row");
            return Ok(None);
        }
        let Some(obj) = self.source.get(clients, name, namespace).await? else {
            return Ok(None);
        };
        let ctx = RowContext { context_name: clients.context_name().await? };
        Ok(Some(build_row(&self.columns, &obj, &ctx)))
    }
}

/// Name-keyed table registry. The first definition registered under a name
/// wins.
#[derive(Debug, Clone, Default)]
pub struct TableMap {
    tables: BTreeMap<String, TableDefinition>,
}

impl TableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is taken; returns whether it was inserted.
    pub fn insert_if_absent(&mut self, table: TableDefinition) -> bool {
        if self.tables.contains_key(&table.name) {
            return false;
        }
        self.tables.insert(table.name.clone(), table);
        true
    }

    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }
}

impl Extend<TableDefinition> for TableMap {
    fn extend<I: IntoIterator<Item = TableDefinition>>(&mut self, iter: I) {
        for t in iter {
            self.insert_if_absent(t);
        }
    }
}
