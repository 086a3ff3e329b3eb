//! Shared state for the exposition HTTP handlers.

use std::sync::Arc;

use crate::obs::MetricsRegistry;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// True while the input stream is still being read.
    pub fn is_streaming(&self) -> bool {
        self.registry.is_stream_open()
    }
}
