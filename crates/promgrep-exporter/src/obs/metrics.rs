//! Instrument registry for rule metrics.
//!
//! One instrument per rule: a scalar counter, or a label-partitioned summary
//! or gauge backed by `DashMap`. Values are `f64` stored as bits in atomics so
//! the `/metrics` handler can read while the owning worker writes. Partitions
//! and families render in a deterministic order.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use promgrep_core::{Extraction, MetricKind, Rule, METRIC_PREFIX};

/// Lines dispatched to workers.
pub const STREAM_LINES_TOTAL: &str = "promgrep_stream_lines_total";
/// 1 while the input stream is being read.
pub const STREAM_OPEN: &str = "promgrep_stream_open";

/// Series names owned by the exporter itself.
pub const RESERVED_SERIES: &[&str] = &[STREAM_LINES_TOTAL, STREAM_OPEN];

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Prometheus float rendering.
fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        format!("{v}")
    }
}

fn label_set(label: &str) -> String {
    if label.is_empty() {
        String::new()
    } else {
        format!("{{label=\"{}\"}}", escape_label(label))
    }
}

#[derive(Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    fn add(&self, v: f64) {
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + v).to_bits())
        });
    }
}

/// Scalar monotonic accumulator.
#[derive(Default)]
pub struct Counter {
    value: AtomicF64,
}

impl Counter {
    /// Add `v`; negative and NaN amounts are refused.
    pub fn add(&self, v: f64) -> bool {
        if v.is_nan() || v < 0.0 {
            return false;
        }
        self.value.add(v);
        true
    }

    pub fn get(&self) -> f64 {
        self.value.load()
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "{} {}", name, fmt_value(self.get()));
    }
}

#[derive(Default)]
struct SummaryCell {
    count: AtomicU64,
    sum: AtomicF64,
}

/// Sample count + sum, partitioned by label.
#[derive(Default)]
pub struct SummaryVec {
    map: DashMap<String, SummaryCell>,
}

impl SummaryVec {
    /// Append one sample to `label`'s partition.
    pub fn observe(&self, label: &str, v: f64) {
        // fast path avoids allocating the key for existing partitions
        if let Some(cell) = self.map.get(label) {
            cell.count.fetch_add(1, Ordering::Relaxed);
            cell.sum.add(v);
            return;
        }
        let cell = self.map.entry(label.to_string()).or_default();
        cell.count.fetch_add(1, Ordering::Relaxed);
        cell.sum.add(v);
    }

    /// `(count, sum)` for a partition, if it exists.
    pub fn get(&self, label: &str) -> Option<(u64, f64)> {
        self.map
            .get(label)
            .map(|c| (c.count.load(Ordering::Relaxed), c.sum.load()))
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(String, u64, f64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.count.load(Ordering::Relaxed), r.sum.load()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (label, count, sum) in rows {
            let ls = label_set(&label);
            let _ = writeln!(out, "{}_sum{} {}", name, ls, fmt_value(sum));
            let _ = writeln!(out, "{}_count{} {}", name, ls, count);
        }
    }
}

/// Last value, partitioned by label.
#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<String, AtomicF64>,
}

impl GaugeVec {
    /// Overwrite `label`'s partition with `v`.
    pub fn set(&self, label: &str, v: f64) {
        if let Some(g) = self.map.get(label) {
            g.store(v);
            return;
        }
        self.map.entry(label.to_string()).or_default().store(v);
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.map.get(label).map(|g| g.load())
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(String, f64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (label, v) in rows {
            let _ = writeln!(out, "{}{} {}", name, label_set(&label), fmt_value(v));
        }
    }
}

/// Instrument shaped after a rule's kind.
pub enum Instrument {
    Counter(Counter),
    Summary(SummaryVec),
    Gauge(GaugeVec),
}

impl Instrument {
    pub fn for_kind(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Instrument::Counter(Counter::default()),
            MetricKind::Summary => Instrument::Summary(SummaryVec::default()),
            MetricKind::Gauge => Instrument::Gauge(GaugeVec::default()),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Instrument::Counter(_) => MetricKind::Counter,
            Instrument::Summary(_) => MetricKind::Summary,
            Instrument::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// A rule's instrument plus the metadata needed to render it.
pub struct RuleMetric {
    name: String,
    help: String,
    instrument: Instrument,
}

impl RuleMetric {
    fn new(rule: &Rule) -> Self {
        let kind = match rule.kind() {
            MetricKind::Counter => "Counter",
            MetricKind::Summary => "Summary",
            MetricKind::Gauge => "Gauge",
        };
        Self {
            name: rule.metric_name(),
            help: format!("{kind} for regex '{}'", rule.pattern()),
            instrument: Instrument::for_kind(rule.kind()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Apply one match to the instrument.
    pub fn record(&self, ex: &Extraction<'_>) {
        match &self.instrument {
            Instrument::Counter(c) => {
                let inc = ex.counter_increment();
                if !c.add(inc) {
                    tracing::debug!(metric = %self.name, amount = inc, "counter cannot decrease, increment dropped");
                }
            }
            Instrument::Summary(s) => s.observe(ex.label, ex.value),
            Instrument::Gauge(g) => g.set(ex.label, ex.value),
        }
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, escape_help(&self.help));
        let _ = writeln!(out, "# TYPE {} {}", self.name, self.instrument.kind());
        match &self.instrument {
            Instrument::Counter(c) => c.render(&self.name, out),
            Instrument::Summary(s) => s.render(&self.name, out),
            Instrument::Gauge(g) => g.render(&self.name, out),
        }
    }
}

/// All rule instruments plus stream self-metrics.
///
/// The instrument list is fixed at construction, so lookups need no lock.
pub struct MetricsRegistry {
    rules: Vec<Arc<RuleMetric>>,
    lines_total: AtomicU64,
    stream_open: AtomicBool,
}

impl MetricsRegistry {
    /// Create one instrument per rule, in rule order.
    pub fn register(rules: &[Rule]) -> Self {
        Self {
            rules: rules.iter().map(|r| Arc::new(RuleMetric::new(r))).collect(),
            lines_total: AtomicU64::new(0),
            stream_open: AtomicBool::new(false),
        }
    }

    /// Instruments in rule order.
    pub fn rule_metrics(&self) -> &[Arc<RuleMetric>] {
        &self.rules
    }

    /// Look up an instrument by rule name (without prefix).
    pub fn get(&self, rule_name: &str) -> Option<&Arc<RuleMetric>> {
        self.rules
            .iter()
            .find(|m| m.name.strip_prefix(METRIC_PREFIX) == Some(rule_name))
    }

    pub fn line_dispatched(&self) {
        self.lines_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines_total(&self) -> u64 {
        self.lines_total.load(Ordering::Relaxed)
    }

    pub fn set_stream_open(&self, open: bool) {
        self.stream_open.store(open, Ordering::Relaxed);
    }

    pub fn is_stream_open(&self) -> bool {
        self.stream_open.load(Ordering::Relaxed)
    }

    /// Render every family in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for m in &self.rules {
            m.render(&mut out);
        }
        let _ = writeln!(out, "# TYPE {STREAM_LINES_TOTAL} counter\n{STREAM_LINES_TOTAL} {}", self.lines_total());
        let _ = writeln!(out, "# TYPE {STREAM_OPEN} gauge\n{STREAM_OPEN} {}", if self.is_stream_open() { 1 } else { 0 });
        out
    }
}
