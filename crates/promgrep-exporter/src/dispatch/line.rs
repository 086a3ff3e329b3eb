use std::sync::Arc;

/// One input record. Shared read-only between workers.
#[derive(Debug, Clone)]
pub struct Line {
    /// Zero-based position in the input stream.
    pub seq: u64,
    pub text: Arc<str>,
}

impl Line {
    pub fn new(seq: u64, text: impl Into<Arc<str>>) -> Self {
        Self { seq, text: text.into() }
    }
}

/// Per-line notifications for layers outside the engine (e.g. echo to stdout).
///
/// Called synchronously from the dispatcher and worker tasks; implementations
/// must not block for long.
pub trait LineObserver: Send + Sync {
    /// A line was read and is about to be fanned out.
    fn on_line(&self, _line: &Line) {}

    /// `rule` finished evaluating `line`.
    fn on_processed(&self, _rule: &str, _line: &Line, _matched: bool) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl LineObserver for NoopObserver {}
