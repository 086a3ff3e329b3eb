//! Stream fan-out: one dispatcher feeding one bounded queue per rule worker.
//!
//! Re-exports the dispatcher, the worker and the line observer hook so
//! downstream consumers can depend on this module directly.

pub mod dispatcher;
pub mod line;
pub mod worker;

pub use dispatcher::StreamDispatcher;
pub use line::{Line, LineObserver, NoopObserver};
pub use worker::RuleWorker;
