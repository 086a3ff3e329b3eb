//! Process glue for the binary: runtime ownership and shutdown signals.

use std::future::Future;
use std::io;
use std::time::Duration;

/// How long a finished process waits for blocking threads before leaving
/// them behind.
pub const RUNTIME_RELEASE_TIMEOUT: Duration = Duration::from_secs(1);

/// Drive `fut` on a fresh multi-thread runtime, then release the runtime.
///
/// Tokio reads stdin on a blocking-pool thread that cancellation never
/// reaches, so the read can outlive the engine when the writer keeps the
/// pipe open. Dropping the runtime would wait for that read; this gives it
/// [`RUNTIME_RELEASE_TIMEOUT`] and moves on.
pub fn run_to_completion<F: Future>(fut: F) -> io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let out = runtime.block_on(fut);
    runtime.shutdown_timeout(RUNTIME_RELEASE_TIMEOUT);
    Ok(out)
}

/// Resolve once `signal` fires.
///
/// A listener that cannot be installed is logged and never resolves, so a
/// broken handler keeps the process serving instead of stopping it.
pub async fn wait_for<F>(name: &str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, signal = name, "cannot listen for signal");
        std::future::pending::<()>().await;
    }
}

/// Resolve on ctrl-c, or on SIGTERM where available.
pub async fn shutdown_signal() {
    let ctrl_c = wait_for("ctrl-c", tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = wait_for("SIGTERM", async {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        term.recv().await;
        Ok::<(), io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
