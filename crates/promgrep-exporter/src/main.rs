//! promgrep
//!
//! Reads stdin line by line, applies every configured rule and serves the
//! resulting metrics over HTTP. Logs go to stderr; stdout carries the
//! pass-through echo selected by `--output`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use promgrep_core::error::{PromgrepError, Result};
use promgrep_exporter::cli::Args;
use promgrep_exporter::dispatch::{LineObserver, NoopObserver};
use promgrep_exporter::engine::{Engine, EngineHandle};
use promgrep_exporter::output::{EchoWriter, OutputMode, Passthrough, DEFAULT_ECHO_CAPACITY};
use promgrep_exporter::process;

const ECHO_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    match process::run_to_completion(run(args)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "cannot build the tokio runtime");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> ExitCode {
    let (mut engine, echo) = match start(args).await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(error = %e, category = e.category().as_str(), "could not start promgrep");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        res = engine.wait_stream() => {
            if let Ok(lines) = res {
                tracing::info!(lines, "input consumed; serving metrics until interrupted");
            }
            process::shutdown_signal().await;
        }
        _ = process::shutdown_signal() => {}
    }

    let stopped = engine.shutdown().await;

    if let Some(echo) = echo {
        // the echo thread lives outside the runtime
        let flushed = tokio::task::block_in_place(|| echo.finish(ECHO_DRAIN_TIMEOUT));
        if !flushed {
            tracing::warn!("stdout is blocked; pending echo lines dropped");
        }
    }

    match stopped {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, category = e.category().as_str(), "shutdown failed");
            ExitCode::FAILURE
        }
    }
}

async fn start(args: Args) -> Result<(EngineHandle, Option<EchoWriter>)> {
    let cfg = args.into_config()?;

    let mut echo = None;
    let observer: Arc<dyn LineObserver> = match cfg.output {
        OutputMode::None => Arc::new(NoopObserver),
        mode => {
            let (passthrough, writer) = Passthrough::spawn(
                mode,
                cfg.rules.len(),
                std::io::stdout(),
                DEFAULT_ECHO_CAPACITY,
            )
            .map_err(|e| PromgrepError::Internal(format!("cannot start echo writer: {e}")))?;
            echo = Some(writer);
            Arc::new(passthrough)
        }
    };

    let cancel = CancellationToken::new();
    let engine = Engine::start(&cfg, tokio::io::stdin(), observer, cancel).await?;
    Ok((engine, echo))
}
