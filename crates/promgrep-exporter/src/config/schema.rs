use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use promgrep_core::error::{PromgrepError, Result};
use promgrep_core::RuleSpec;

use crate::dispatch::dispatcher::DEFAULT_MAX_LINE_BYTES;
use crate::dispatch::worker::DEFAULT_QUEUE_CAPACITY;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromgrepConfig {
    pub version: u32,

    #[serde(default)]
    pub exporter: ExporterSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub output: OutputMode,

    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Default for PromgrepConfig {
    fn default() -> Self {
        Self {
            version: 1,
            exporter: ExporterSection::default(),
            engine: EngineSection::default(),
            output: OutputMode::default(),
            rules: Vec::new(),
        }
    }
}

impl PromgrepConfig {
    /// Range checks only; rules are checked when compiled.
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PromgrepError::InvalidConfig(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.exporter.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    #[serde(default = "default_host")]
    pub host: String,

    /// 0 lets the OS pick a port.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl ExporterSection {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(PromgrepError::InvalidConfig("exporter.host must not be empty".into()));
        }
        if !self.path.starts_with('/') {
            return Err(PromgrepError::InvalidConfig(
                "exporter.path must start with '/'".into(),
            ));
        }
        if self.path == "/healthz" || self.path == "/readyz" {
            return Err(PromgrepError::InvalidConfig(format!(
                "exporter.path {} is reserved",
                self.path
            )));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8880
}
fn default_path() -> String {
    "/metrics".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65536).contains(&self.queue_capacity) {
            return Err(PromgrepError::InvalidConfig(
                "engine.queue_capacity must be between 1 and 65536".into(),
            ));
        }
        if !(1024..=64 * 1024 * 1024).contains(&self.max_line_bytes) {
            return Err(PromgrepError::InvalidConfig(
                "engine.max_line_bytes must be between 1024 and 67108864".into(),
            ));
        }
        Ok(())
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

/// What the input stream echoes to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Silent.
    None,
    /// Lines matched by at least one rule.
    #[default]
    Match,
    /// Every input line.
    All,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::None => "none",
            OutputMode::Match => "match",
            OutputMode::All => "all",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = PromgrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(OutputMode::None),
            "match" => Ok(OutputMode::Match),
            "all" => Ok(OutputMode::All),
            other => Err(PromgrepError::InvalidConfig(format!(
                "output must be one of none, match, all (got {other})"
            ))),
        }
    }
}
