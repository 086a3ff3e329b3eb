//! promgrep core: rule compilation, capture extraction, and error types.
//!
//! This crate holds the runtime-free half of promgrep: turning `(name,
//! pattern, kind)` tuples into compiled rules and turning regex matches into
//! value/label pairs. It carries no async runtime or HTTP dependencies so the
//! extraction policy can be exercised in isolation.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Every fallible path
//! surfaces as `PromgrepError`/`Result`; a capture that fails to parse is not
//! an error at all and becomes a label instead.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod extract;
pub mod rule;

/// Shared result type.
pub use error::{ErrorCategory, PromgrepError, Result};
pub use extract::{Extraction, MAX_MATCHES_PER_LINE};
pub use rule::{compile_rules, MetricKind, Rule, RuleSpec, METRIC_PREFIX};
