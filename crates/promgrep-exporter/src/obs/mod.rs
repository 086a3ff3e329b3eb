//! In-process rule instruments and their Prometheus rendering.
//!
//! Instruments are stored as atomics behind `DashMap` partitions and rendered
//! by the exposition handler on every scrape.

pub mod metrics;

pub use metrics::{Instrument, MetricsRegistry, RuleMetric, RESERVED_SERIES};
