//! Continuation-token pagination shared by every lister.
//!
//! One request per page, strictly sequential. The first request asks for
//! `min(page size, budget)` items; each later request carries the token the
//! previous response returned, until the server returns an empty one. The
//! caller's `emit` decides when the row budget is spent by returning
//! [`ControlFlow::Break`]; cancellation is polled before every request and
//! after every item.

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Instant;

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::Result;

pub const PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` when this was the last page.
    pub continue_token: Option<String>,
}

/// Anything that can serve one page of a list call.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn fetch_page(&self, params: &ListParams) -> Result<Page<Self::Item>>;
}

#[async_trait]
impl<K> PageSource for Api<K>
where
    K: Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    type Item = K;

    async fn fetch_page(&self, params: &ListParams) -> Result<Page<K>> {
        let list = self.list(params).await?;
        let continue_token = list.metadata.continue_.filter(|t| !t.is_empty());
        Ok(Page { items: list.items, continue_token })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPlan {
    pub page_size: u32,
    /// Rows the caller wants at most.
    pub limit: Option<u64>,
    pub field_selector: Option<String>,
}

impl Default for ListPlan {
    fn default() -> Self {
        Self { page_size: PAGE_SIZE, limit: None, field_selector: None }
    }
}

impl ListPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_field_selector(mut self, selector: Option<String>) -> Self {
        self.field_selector = selector.filter(|s| !s.is_empty());
        self
    }

    /// Page size for the first request. A budget below one is raised to one.
    pub fn effective_page_size(&self) -> u32 {
        match self.limit {
            Some(l) if l < u64::from(self.page_size) => l.max(1) as u32,
            _ => self.page_size.max(1),
        }
    }

    pub fn params(&self) -> ListParams {
        let mut lp = ListParams::default().limit(self.effective_page_size());
        if let Some(fs) = &self.field_selector {
            lp = lp.fields(fs);
        }
        lp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The server returned an empty continuation token.
    Exhausted,
    BudgetReached,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOutcome {
    pub pages: u32,
    pub items: u64,
    pub stop: StopReason,
}

impl ListOutcome {
    pub fn empty(stop: StopReason) -> Self {
        Self { pages: 0, items: 0, stop }
    }

    /// Fold another listing's counts into this one, keeping its stop reason.
    pub fn absorb(&mut self, other: ListOutcome) {
        self.pages += other.pages;
        self.items += other.items;
        self.stop = other.stop;
    }
}

/// Drive `source` page by page, handing each item to `emit`.
///
/// Request errors abort the listing and are returned unchanged; items already
/// emitted stay emitted.
pub async fn paginate<S, F>(source: &S, plan: &ListPlan, cancel: &CancellationToken, mut emit: F) -> Result<ListOutcome>
where
    S: PageSource + ?Sized,
    F: FnMut(S::Item) -> ControlFlow<()> + Send,
{
    if plan.limit == Some(0) {
        return Ok(ListOutcome::empty(StopReason::BudgetReached));
    }
    let mut params = plan.params();
    let mut outcome = ListOutcome::empty(StopReason::Exhausted);
    loop {
        if cancel.is_cancelled() {
            debug!(pages = outcome.pages, items = outcome.items, "listing cancelled before page request");
            outcome.stop = StopReason::Cancelled;
            return Ok(outcome);
        }
        let started = Instant::now();
        let page = match source.fetch_page(&params).await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, page = outcome.pages + 1, "list request failed");
                counter!("kubetab_list_errors_total", 1u64);
                return Err(e);
            }
        };
        histogram!("kubetab_list_page_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("kubetab_list_pages_total", 1u64);
        outcome.pages += 1;
        trace!(page = outcome.pages, items = page.items.len(), more = page.continue_token.is_some(), "page received");

        for item in page.items {
            outcome.items += 1;
            counter!("kubetab_list_items_total", 1u64);
            if emit(item).is_break() {
                outcome.stop = StopReason::BudgetReached;
                return Ok(outcome);
            }
            if cancel.is_cancelled() {
                outcome.stop = StopReason::Cancelled;
                return Ok(outcome);
            }
        }

        match page.continue_token {
            Some(token) => params.continue_token = Some(token),
            None => return Ok(outcome),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    /// In-memory list endpoint; the continuation token is the next offset.
    pub(crate) struct FakeSource<T> {
        pub(crate) items: Vec<T>,
        pub(crate) requests: Mutex<Vec<ListParams>>,
        pub(crate) fail_on_page: Option<usize>,
    }

    impl<T> FakeSource<T> {
        pub(crate) fn new(items: Vec<T>) -> Self {
            Self { items, requests: Mutex::new(Vec::new()), fail_on_page: None }
        }

        pub(crate) fn requests(&self) -> Vec<ListParams> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> PageSource for FakeSource<T> {
        type Item = T;

        async fn fetch_page(&self, params: &ListParams) -> Result<Page<T>> {
            let n = {
                let mut reqs = self.requests.lock().unwrap();
                reqs.push(params.clone());
                reqs.len()
            };
            if self.fail_on_page == Some(n) {
                return Err(Error::Config("connection reset".into()));
            }
            let start: usize = params.continue_token.as_deref().map(|t| t.parse().unwrap()).unwrap_or(0);
            let size = params.limit.unwrap_or(PAGE_SIZE) as usize;
            let end = (start + size).min(self.items.len());
            let continue_token = if end < self.items.len() { Some(end.to_string()) } else { None };
            Ok(Page { items: self.items[start..end].to_vec(), continue_token })
        }
    }

    fn plan(page_size: u32) -> ListPlan {
        ListPlan { page_size, ..ListPlan::default() }
    }

    #[tokio::test]
    async fn drains_all_pages() {
        let source = FakeSource::new((0..1234u32).collect());
        let mut seen = Vec::new();
        let out = paginate(&source, &ListPlan::new(), &CancellationToken::new(), |i| {
            seen.push(i);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(seen.len(), 1234);
        assert_eq!(out, ListOutcome { pages: 3, items: 1234, stop: StopReason::Exhausted });
        assert_eq!(source.requests().len(), 3);
    }

    #[tokio::test]
    async fn tokens_are_never_reused() {
        let source = FakeSource::new((0..10u32).collect());
        paginate(&source, &plan(3), &CancellationToken::new(), |_| ControlFlow::Continue(())).await.unwrap();
        let tokens: Vec<Option<String>> = source.requests().into_iter().map(|p| p.continue_token).collect();
        assert_eq!(tokens, vec![None, Some("3".into()), Some("6".into()), Some("9".into())]);
    }

    #[tokio::test]
    async fn budget_stops_early_and_shrinks_first_page() {
        let source = FakeSource::new((0..2000u32).collect());
        let plan = ListPlan::new().with_limit(Some(10));
        let mut seen = 0u64;
        let out = paginate(&source, &plan, &CancellationToken::new(), |_| {
            seen += 1;
            if seen >= 10 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        })
        .await
        .unwrap();
        assert_eq!(seen, 10);
        assert_eq!(out.stop, StopReason::BudgetReached);
        let reqs = source.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].limit, Some(10));
    }

    #[tokio::test]
    async fn zero_budget_issues_no_request() {
        let source = FakeSource::new((0..5u32).collect());
        let mut seen = 0;
        let out = paginate(&source, &ListPlan::new().with_limit(Some(0)), &CancellationToken::new(), |_| {
            seen += 1;
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(seen, 0);
        assert_eq!(out, ListOutcome::empty(StopReason::BudgetReached));
        assert!(source.requests().is_empty());
    }

    #[test]
    fn page_size_floor_and_cap() {
        assert_eq!(ListPlan::new().with_limit(Some(0)).effective_page_size(), 1);
        assert_eq!(ListPlan::new().with_limit(Some(499)).effective_page_size(), 499);
        assert_eq!(ListPlan::new().with_limit(Some(500)).effective_page_size(), 500);
        assert_eq!(ListPlan::new().with_limit(Some(10_000)).effective_page_size(), 500);
        assert_eq!(ListPlan::new().effective_page_size(), 500);
    }

    #[tokio::test]
    async fn selector_rides_on_every_page() {
        let source = FakeSource::new((0..7u32).collect());
        let plan = plan(2).with_field_selector(Some("metadata.namespace=kube-system".into()));
        paginate(&source, &plan, &CancellationToken::new(), |_| ControlFlow::Continue(())).await.unwrap();
        let reqs = source.requests();
        assert_eq!(reqs.len(), 4);
        assert!(reqs.iter().all(|p| p.field_selector.as_deref() == Some("metadata.namespace=kube-system")));
    }

    #[tokio::test]
    async fn cancellation_stops_page_requests() {
        let source = FakeSource::new((0..10u32).collect());
        let cancel = CancellationToken::new();
        let out = paginate(&source, &plan(2), &cancel, |i| {
            if i == 3 {
                cancel.cancel();
            }
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(out.stop, StopReason::Cancelled);
        assert_eq!(out.items, 4);
        assert_eq!(source.requests().len(), 2);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let out = paginate(&source, &plan(2), &cancelled, |_| ControlFlow::Continue(())).await.unwrap();
        assert_eq!(out, ListOutcome::empty(StopReason::Cancelled));
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn request_error_aborts_after_partial_emit() {
        let mut source = FakeSource::new((0..10u32).collect());
        source.fail_on_page = Some(2);
        let mut seen = 0;
        let res = paginate(&source, &plan(4), &CancellationToken::new(), |_| {
            seen += 1;
            ControlFlow::Continue(())
        })
        .await;
        assert!(matches!(res, Err(Error::Config(_))));
        assert_eq!(seen, 4);
        assert_eq!(source.requests().len(), 2);
    }
}
