//! Rule worker: evaluates one rule against every dispatched line.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use promgrep_core::Rule;

use crate::obs::RuleMetric;

use super::line::{Line, LineObserver};

/// Default per-worker queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Consumes lines from a private queue and updates the rule's instrument.
///
/// The worker is the only writer of its instrument.
pub struct RuleWorker {
    rule: Rule,
    metric: Arc<RuleMetric>,
    receiver: mpsc::Receiver<Line>,
    observer: Arc<dyn LineObserver>,
    cancel: CancellationToken,
}

impl RuleWorker {
    /// Create a worker and the sending half of its queue.
    pub fn new(
        rule: Rule,
        metric: Arc<RuleMetric>,
        capacity: usize,
        observer: Arc<dyn LineObserver>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<Line>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = Self {
            rule,
            metric,
            receiver,
            observer,
            cancel,
        };
        (worker, sender)
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Run until the queue is closed and drained, or cancellation is seen.
    ///
    /// Returns the number of lines processed.
    pub async fn run(mut self) -> u64 {
        tracing::debug!("rule worker started");
        let mut processed = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::debug!("rule worker cancelled");
                    break;
                }

                next = self.receiver.recv() => {
                    let Some(line) = next else { break; };
                    // queued lines are abandoned once shutdown starts
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    self.process(&line);
                    processed += 1;
                }
            }
        }

        tracing::debug!(processed, "rule worker stopped");
        processed
    }

    /// Apply the rule to one line; returns the number of matches recorded.
    pub fn process(&self, line: &Line) -> usize {
        let mut matches = 0;
        for ex in self.rule.extract(&line.text) {
            self.metric.record(&ex);
            matches += 1;
        }
        if matches > 0 {
            tracing::trace!(line = line.seq, matches, "line matched");
        }
        self.observer.on_processed(self.rule.name(), line, matches > 0);
        matches
    }
}
