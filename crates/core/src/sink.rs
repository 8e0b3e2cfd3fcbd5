//! Row sinks: where listed rows go, and how a lister learns to stop.

use crate::Row;

/// Destination for streamed rows.
pub trait RowSink: Send {
    fn emit(&mut self, row: Row);

    /// Rows the caller still wants; `None` means unbounded.
    fn rows_remaining(&self) -> Option<u64>;

    fn is_exhausted(&self) -> bool {
        self.rows_remaining() == Some(0)
    }
}

/// Caller-imposed upper bound on emitted rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowBudget {
    limit: Option<u64>,
    emitted: u64,
}

impl RowBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, emitted: 0 }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn record(&mut self) {
        self.emitted += 1;
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.emitted))
    }
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    rows: Vec<Row>,
    budget: RowBudget,
}

impl VecSink {
    pub fn new(limit: Option<u64>) -> Self {
        Self { rows: Vec::new(), budget: RowBudget::new(limit) }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl RowSink for VecSink {
    fn emit(&mut self, row: Row) {
        if self.budget.remaining() == Some(0) {
            return;
        }
        self.budget.record();
        self.rows.push(row);
    }

    fn rows_remaining(&self) -> Option<u64> {
        self.budget.remaining()
    }
}

/// Streams each row into a callback.
pub struct FnSink<F> {
    f: F,
    budget: RowBudget,
}

impl<F: FnMut(Row) + Send> FnSink<F> {
    pub fn new(limit: Option<u64>, f: F) -> Self {
        Self { f, budget: RowBudget::new(limit) }
    }

    pub fn emitted(&self) -> u64 {
        self.budget.emitted()
    }
}

impl<F: FnMut(Row) + Send> RowSink for FnSink<F> {
    fn emit(&mut self, row: Row) {
        if self.budget.remaining() == Some(0) {
            return;
        }
        self.budget.record();
        (self.f)(row);
    }

    fn rows_remaining(&self) -> Option<u64> {
        self.budget.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_honours_budget() {
        let mut sink = VecSink::new(Some(2));
        assert!(!sink.is_exhausted());
        sink.emit(Row::new());
        sink.emit(Row::new());
        assert!(sink.is_exhausted());
        sink.emit(Row::new());
        assert_eq!(sink.rows().len(), 2);
    }

    #[test]
    fn unbounded_sink_is_never_exhausted() {
        let mut seen = 0u32;
        let mut sink = FnSink::new(None, |_| seen += 1);
        for _ in 0..5 {
            sink.emit(Row::new());
        }
        assert_eq!(sink.rows_remaining(), None);
        assert_eq!(sink.emitted(), 5);
        drop(sink);
        assert_eq!(seen, 5);
    }
}
