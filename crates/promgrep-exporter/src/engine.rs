//! Engine lifecycle: startup checks, task spawning and cancellation.
//!
//! `Engine::start` performs every fallible configuration step (rule
//! compilation, config validation, socket bind) before touching the input, then
//! spawns one listener task, one dispatcher task and one worker task per rule.
//! A single `CancellationToken` stops all of them.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use promgrep_core::compile_rules;
use promgrep_core::error::{PromgrepError, Result};

use crate::app_state::AppState;
use crate::config::PromgrepConfig;
use crate::dispatch::{LineObserver, RuleWorker, StreamDispatcher};
use crate::obs::{MetricsRegistry, RESERVED_SERIES};
use crate::router;

pub struct Engine;

impl Engine {
    /// Validate, bind and spawn. Nothing is read from `input` if this fails.
    pub async fn start<R>(
        cfg: &PromgrepConfig,
        input: R,
        observer: Arc<dyn LineObserver>,
        cancel: CancellationToken,
    ) -> Result<EngineHandle>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let rules = compile_rules(&cfg.rules, RESERVED_SERIES)?;
        cfg.validate()?;

        let registry = Arc::new(MetricsRegistry::register(&rules));

        let exporter = &cfg.exporter;
        let listener = TcpListener::bind((exporter.host.as_str(), exporter.port))
            .await
            .map_err(|source| PromgrepError::Bind {
                addr: format!("{}:{}", exporter.host, exporter.port),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PromgrepError::Internal(format!("listener address unavailable: {e}")))?;

        let app = router::build_router(AppState::new(Arc::clone(&registry)), &exporter.path);
        let server_cancel = cancel.clone();
        let server = tokio::spawn(async move {
            let shutdown = async move { server_cancel.cancelled().await };
            // a dead listener does not stop stream consumption
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::error!(error = %e, "metrics listener failed");
            }
            tracing::debug!("metrics listener stopped");
        });
        tracing::info!(addr = %local_addr, path = %exporter.path, "serving prometheus metrics");

        let mut queues = Vec::with_capacity(rules.len());
        let mut workers = Vec::with_capacity(rules.len());
        for (rule, metric) in rules.into_iter().zip(registry.rule_metrics().iter().cloned()) {
            let span = tracing::info_span!("rule", rule = %rule.name(), kind = %rule.kind());
            let (worker, queue) = RuleWorker::new(
                rule,
                metric,
                cfg.engine.queue_capacity,
                Arc::clone(&observer),
                cancel.clone(),
            );
            queues.push(queue);
            workers.push(tokio::spawn(worker.run().instrument(span)));
        }

        let dispatcher = StreamDispatcher::new(
            input,
            queues,
            Arc::clone(&registry),
            observer,
            cancel.clone(),
            cfg.engine.max_line_bytes,
        );
        let dispatcher = tokio::spawn(
            async move {
                let res = dispatcher.run().await;
                if let Err(e) = &res {
                    tracing::warn!(error = %e, "input stream terminated");
                }
                res
            }
            .instrument(tracing::info_span!("dispatcher")),
        );

        tracing::info!(rules = workers.len(), "engine started");

        Ok(EngineHandle {
            local_addr,
            registry,
            cancel,
            server: Some(server),
            dispatcher: Some(dispatcher),
            workers,
        })
    }
}

/// Running engine. Dropping it detaches the tasks; call [`EngineHandle::shutdown`].
pub struct EngineHandle {
    local_addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
    cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<Result<u64>>>,
    workers: Vec<JoinHandle<u64>>,
}

impl EngineHandle {
    /// Address the metrics listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the input stream to end and every worker to drain.
    ///
    /// Returns the number of lines dispatched, or the read error that ended
    /// the stream. Safe to call again, or to drop mid-wait.
    pub async fn wait_stream(&mut self) -> Result<u64> {
        let mut outcome = Ok(self.registry.lines_total());

        if let Some(handle) = self.dispatcher.as_mut() {
            let joined = handle.await;
            self.dispatcher = None;
            outcome = joined
                .map_err(|e| PromgrepError::Internal(format!("dispatcher task failed: {e}")))
                .and_then(|r| r);
        }

        while let Some(handle) = self.workers.last_mut() {
            let joined = handle.await;
            self.workers.pop();
            if let Err(e) = joined {
                tracing::error!(error = %e, "rule worker task failed");
            }
        }

        outcome
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!("shutting down");
        self.cancel.cancel();

        // a read error is an expected way for the stream to end
        if let Err(e) = self.wait_stream().await {
            if e.category() != promgrep_core::ErrorCategory::Stream {
                return Err(e);
            }
        }

        if let Some(handle) = self.server.take() {
            handle
                .await
                .map_err(|e| PromgrepError::Internal(format!("listener task failed: {e}")))?;
        }
        Ok(())
    }
}
