use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use promgrep_core::error::{PromgrepError, Result};

use crate::obs::MetricsRegistry;

use super::line::{Line, LineObserver};

/// Default upper bound for a single input line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reads the input stream and broadcasts every line to all worker queues.
///
/// Line `i` reaches every queue before line `i + 1` reaches any. A full queue
/// stalls the whole fan-out, so memory stays bounded by the queue capacities.
pub struct StreamDispatcher<R> {
    reader: BufReader<R>,
    queues: Vec<mpsc::Sender<Line>>,
    registry: Arc<MetricsRegistry>,
    observer: Arc<dyn LineObserver>,
    cancel: CancellationToken,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> StreamDispatcher<R> {
    pub fn new(
        input: R,
        queues: Vec<mpsc::Sender<Line>>,
        registry: Arc<MetricsRegistry>,
        observer: Arc<dyn LineObserver>,
        cancel: CancellationToken,
        max_line_bytes: usize,
    ) -> Self {
        Self {
            reader: BufReader::new(input),
            queues,
            registry,
            observer,
            cancel,
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Pump lines until end-of-stream, a read error, or cancellation.
    ///
    /// Every queue is closed on return, whatever the reason. Returns the number
    /// of lines dispatched.
    pub async fn run(self) -> Result<u64> {
        let Self {
            mut reader,
            queues,
            registry,
            observer,
            cancel,
            max_line_bytes,
        } = self;

        if queues.is_empty() {
            return Err(PromgrepError::NoRules);
        }

        registry.set_stream_open(true);
        let mut buf = Vec::with_capacity(256);
        let mut seq = 0u64;

        let outcome = 'stream: loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'stream Ok(()),
                r = read_line(&mut reader, &mut buf, max_line_bytes) => r,
            };

            let text = match read {
                Ok(Some(text)) => text,
                Ok(None) => {
                    tracing::info!(lines = seq, "input stream ended");
                    break 'stream Ok(());
                }
                Err(e) => break 'stream Err(e),
            };

            let line = Line::new(seq, text);
            observer.on_line(&line);

            for queue in &queues {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'stream Ok(()),
                    sent = queue.send(line.clone()) => {
                        // a closed queue means its worker already quit on cancellation
                        if sent.is_err() {
                            tracing::debug!(line = seq, "worker queue closed, line not delivered");
                        }
                    }
                }
            }

            registry.line_dispatched();
            seq += 1;
        };

        if cancel.is_cancelled() {
            tracing::info!(lines = seq, "stream dispatcher cancelled");
        }

        // dropping the senders closes every worker queue
        drop(queues);
        registry.set_stream_open(false);

        outcome.map(|()| seq)
    }
}

/// Read one `\n`-terminated line, stripping `\r\n`/`\n`.
///
/// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced lossily.
async fn read_line<B: AsyncBufRead + Unpin>(
    reader: &mut B,
    buf: &mut Vec<u8>,
    max_line_bytes: usize,
) -> Result<Option<String>> {
    buf.clear();
    // one extra byte leaves room for the terminator of a maximal line
    let n = (&mut *reader)
        .take(max_line_bytes as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_line_bytes {
        return Err(PromgrepError::LineTooLong(max_line_bytes));
    }

    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
