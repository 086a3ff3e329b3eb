//! Command-line flags and their merge with the optional config file.

use clap::Parser;

use promgrep_core::error::Result;
use promgrep_core::{MetricKind, RuleSpec};

use crate::config::{self, OutputMode, PromgrepConfig};

/// Expose Prometheus metrics grepped from a text stream on stdin.
#[derive(Parser, Debug, Default)]
#[command(name = "promgrep", version, about)]
pub struct Args {
    /// YAML config file; flags below override it and append rules to it
    #[arg(long)]
    pub config: Option<String>,

    /// Prometheus exporter bind host [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Prometheus exporter port [default: 8880]
    #[arg(long)]
    pub port: Option<u16>,

    /// Prometheus exporter path [default: /metrics]
    #[arg(long)]
    pub path: Option<String>,

    /// What to echo to stdout: none, match (matched lines) or all [default: match]
    #[arg(long)]
    pub output: Option<OutputMode>,

    /// Per-rule queue capacity [default: 1024]
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Summary rule, e.g. 'question@question\sfinished\s([0-9]+)ms'.
    /// Exposes a sample count and the sum of the captured values.
    #[arg(long = "summary", value_name = "NAME@REGEX")]
    pub summary: Vec<String>,

    /// Gauge rule, e.g. 'temperature@temp-now-is-([0-9\.]+)degrees'.
    /// The regex needs a capture group holding the value.
    #[arg(long = "gauge", value_name = "NAME@REGEX")]
    pub gauge: Vec<String>,

    /// Counter rule; counts matches, or sums the captured amount if it is numeric
    #[arg(long = "counter", value_name = "NAME@REGEX")]
    pub counter: Vec<String>,
}

impl Args {
    /// Resolve the effective config: file (if any), then flags on top.
    pub fn into_config(self) -> Result<PromgrepConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from_file(path)?,
            None => PromgrepConfig::default(),
        };

        if let Some(host) = self.host {
            cfg.exporter.host = host;
        }
        if let Some(port) = self.port {
            cfg.exporter.port = port;
        }
        if let Some(path) = self.path {
            cfg.exporter.path = path;
        }
        if let Some(output) = self.output {
            cfg.output = output;
        }
        if let Some(capacity) = self.queue_capacity {
            cfg.engine.queue_capacity = capacity;
        }

        let flagged = [
            (MetricKind::Summary, &self.summary),
            (MetricKind::Gauge, &self.gauge),
            (MetricKind::Counter, &self.counter),
        ];
        for (kind, raw_rules) in flagged {
            for raw in raw_rules {
                cfg.rules.push(RuleSpec::parse_shorthand(raw, kind)?);
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
