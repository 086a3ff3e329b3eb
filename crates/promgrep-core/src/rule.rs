//! Pattern rules: a compiled regex bound to a metric name and kind.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use crate::error::{PromgrepError, Result};
use crate::extract::{Extraction, MAX_MATCHES_PER_LINE};

/// Prefix applied to every exported metric name.
pub const METRIC_PREFIX: &str = "promgrep_";

/// Instrument shape a rule feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic accumulator; +1 per match unless a capture parses.
    Counter,
    /// Sample count and sum per label.
    Summary,
    /// Last value per label.
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Summary => "summary",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = PromgrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "summary" => Ok(MetricKind::Summary),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(PromgrepError::InvalidConfig(format!("unknown metric kind: {other}"))),
        }
    }
}

/// Uncompiled rule as it comes from config or CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    pub pattern: String,
    pub kind: MetricKind,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, kind: MetricKind) -> Self {
        Self { name: name.into(), pattern: pattern.into(), kind }
    }

    /// Parse the `name@regex` shorthand used on the command line.
    pub fn parse_shorthand(raw: &str, kind: MetricKind) -> Result<Self> {
        let (name, pattern) = raw.split_once('@').ok_or_else(|| {
            PromgrepError::InvalidConfig(format!(
                "metric definition {raw} must be in format [name]@[regex]"
            ))
        })?;
        Ok(Self::new(name, pattern, kind))
    }
}

/// Compiled, immutable rule.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    kind: MetricKind,
    regex: Regex,
    // empty pattern matches once per line instead of at every position
    match_once: bool,
}

impl Rule {
    /// Compile a single rule and check its kind-specific invariants.
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        validate_name(&spec.name)?;

        let regex = Regex::new(&spec.pattern).map_err(|source| PromgrepError::InvalidPattern {
            rule: spec.name.clone(),
            source,
        })?;

        // captures_len counts the implicit whole-match group
        if spec.kind == MetricKind::Gauge && regex.captures_len() < 2 {
            return Err(PromgrepError::GaugeWithoutCapture(spec.name.clone()));
        }

        Ok(Self {
            name: spec.name.clone(),
            kind: spec.kind,
            match_once: spec.pattern.is_empty(),
            regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Exported metric family name (`promgrep_<name>`).
    pub fn metric_name(&self) -> String {
        format!("{METRIC_PREFIX}{}", self.name)
    }

    /// Every series name this rule renders.
    pub fn series_names(&self) -> Vec<String> {
        let base = self.metric_name();
        match self.kind {
            MetricKind::Summary => vec![format!("{base}_count"), format!("{base}_sum"), base],
            MetricKind::Counter | MetricKind::Gauge => vec![base],
        }
    }

    /// Non-overlapping extractions for `line`, capped at [`MAX_MATCHES_PER_LINE`].
    pub fn extract<'a>(&'a self, line: &'a str) -> impl Iterator<Item = Extraction<'a>> + 'a {
        let limit = if self.match_once { 1 } else { MAX_MATCHES_PER_LINE };
        self.regex
            .captures_iter(line)
            .take(limit)
            .map(|caps| Extraction::from_captures(&caps))
    }
}

/// Compile a rule set, rejecting empty sets and colliding series names.
///
/// `reserved` holds full series names already taken by the exporter itself.
pub fn compile_rules(specs: &[RuleSpec], reserved: &[&str]) -> Result<Vec<Rule>> {
    if specs.is_empty() {
        return Err(PromgrepError::NoRules);
    }

    let mut names: HashSet<&str> = HashSet::new();
    let mut series: HashSet<String> = reserved.iter().map(|s| s.to_string()).collect();
    let mut out = Vec::with_capacity(specs.len());

    for spec in specs {
        if !names.insert(spec.name.as_str()) {
            return Err(PromgrepError::DuplicateRule(spec.name.clone()));
        }
        let rule = Rule::compile(spec)?;
        for s in rule.series_names() {
            if !series.insert(s.clone()) {
                return Err(PromgrepError::DuplicateRule(s));
            }
        }
        tracing::debug!(rule = %rule.name, kind = %rule.kind, pattern = %rule.pattern(), "rule compiled");
        out.push(rule);
    }
    Ok(out)
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(PromgrepError::InvalidRuleName(name.to_string()))
    }
}
