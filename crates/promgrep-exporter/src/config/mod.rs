//! Config loader (strict parsing).

pub mod schema;

use std::fs;

use promgrep_core::error::{PromgrepError, Result};

pub use schema::{EngineSection, ExporterSection, OutputMode, PromgrepConfig};

pub fn load_from_file(path: &str) -> Result<PromgrepConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PromgrepError::InvalidConfig(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<PromgrepConfig> {
    let cfg: PromgrepConfig = serde_yaml::from_str(s)
        .map_err(|e| PromgrepError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
