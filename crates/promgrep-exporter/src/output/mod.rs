//! Pass-through echo of the input stream.
//!
//! `all` echoes each line as the dispatcher reads it. `match` waits until
//! every rule worker has reported on a line and echoes it once if any rule
//! matched.
//!
//! Echoed lines are handed to a dedicated writer thread over a bounded
//! channel, so runtime threads never perform the write. The completion check
//! and the hand-off happen under one lock, which makes the channel order (and
//! therefore the output order) the order in which lines completed. Workers
//! consume lines in stream order, so that is stream order.

use std::io::{BufWriter, Write};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::dispatch::{Line, LineObserver};

pub use crate::config::OutputMode;

/// Lines buffered between the observers and the writer thread.
pub const DEFAULT_ECHO_CAPACITY: usize = 1024;

struct Pending {
    remaining: usize,
    matched: bool,
}

/// [`LineObserver`] forwarding selected lines to an [`EchoWriter`].
pub struct Passthrough {
    mode: OutputMode,
    rules: usize,
    pending: DashMap<u64, Pending>,
    // held across completion and hand-off
    tx: Mutex<SyncSender<Arc<str>>>,
}

/// The writer thread behind a [`Passthrough`].
///
/// The thread exits once every `Passthrough` handle is dropped and the
/// channel is drained.
pub struct EchoWriter {
    done: Receiver<()>,
}

impl EchoWriter {
    /// Wait up to `timeout` for the writer to flush and exit.
    ///
    /// Returns `false` when the output is still blocked after `timeout`.
    pub fn finish(self, timeout: Duration) -> bool {
        self.done.recv_timeout(timeout).is_ok()
    }
}

impl Passthrough {
    /// `rules` is the number of workers that report on each line.
    pub fn spawn<W>(
        mode: OutputMode,
        rules: usize,
        out: W,
        capacity: usize,
    ) -> std::io::Result<(Self, EchoWriter)>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<Arc<str>>(capacity.max(1));
        let (done_tx, done) = mpsc::channel();

        thread::Builder::new()
            .name("promgrep-echo".into())
            .spawn(move || {
                write_all(rx, out);
                let _ = done_tx.send(());
            })?;

        let passthrough = Self {
            mode,
            rules,
            pending: DashMap::new(),
            tx: Mutex::new(tx),
        };
        Ok((passthrough, EchoWriter { done }))
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn echo(&self, tx: &SyncSender<Arc<str>>, line: &Line) {
        match tx.try_send(line.text.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(text)) => {
                if blocking(|| tx.send(text)).is_err() {
                    tracing::debug!(line = line.seq, "echo writer gone, line dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(line = line.seq, "echo writer gone, line dropped");
            }
        }
    }
}

impl LineObserver for Passthrough {
    fn on_line(&self, line: &Line) {
        match self.mode {
            OutputMode::All => {
                let Ok(tx) = self.tx.lock() else { return; };
                self.echo(&tx, line);
            }
            OutputMode::Match => {
                self.pending.insert(
                    line.seq,
                    Pending {
                        remaining: self.rules,
                        matched: false,
                    },
                );
            }
            OutputMode::None => {}
        }
    }

    fn on_processed(&self, _rule: &str, line: &Line, matched: bool) {
        if self.mode != OutputMode::Match {
            return;
        }

        let Ok(tx) = self.tx.lock() else { return; };

        let complete = {
            let Some(mut p) = self.pending.get_mut(&line.seq) else { return; };
            p.remaining = p.remaining.saturating_sub(1);
            p.matched |= matched;
            (p.remaining == 0).then_some(p.matched)
        };

        if let Some(matched) = complete {
            self.pending.remove(&line.seq);
            if matched {
                self.echo(&tx, line);
            }
        }
    }
}

/// Run `f`, which may block, without starving the runtime it is called from.
///
/// On a multi-thread runtime the worker hands its other tasks to a fresh
/// thread first. Elsewhere `f` simply runs.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(h) if h.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

fn write_all<W: Write>(rx: Receiver<Arc<str>>, out: W) {
    let mut out = BufWriter::new(out);
    while let Ok(text) = rx.recv() {
        let mut batch = Some(text);
        while let Some(text) = batch {
            if let Err(e) = writeln!(out, "{text}") {
                tracing::debug!(error = %e, "echo write failed");
            }
            batch = rx.try_recv().ok();
        }
        if let Err(e) = out.flush() {
            tracing::debug!(error = %e, "echo flush failed");
        }
    }
}
