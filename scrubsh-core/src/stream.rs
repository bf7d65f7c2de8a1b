// scrubsh-core/src/stream.rs
//! Byte streams between redaction stages.
//!
//! Every redactor runs as a producer task that writes into a bounded channel;
//! the returned [`ByteStream`] reads from the other end. A slow consumer
//! therefore holds the producer back, and dropping the stream stops the
//! producer at its next write.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use log::debug;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// An owned, sendable byte stream.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Chunks in flight between a producer and its consumer.
pub const CHANNEL_CAPACITY: usize = 32;

type Chunk = io::Result<Vec<u8>>;

/// The consumer side of a redaction stage.
pub struct RedactedStream {
    rx: mpsc::Receiver<Chunk>,
    chunk: Vec<u8>,
    pos: usize,
    done: bool,
}

impl RedactedStream {
    fn new(rx: mpsc::Receiver<Chunk>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
            done: false,
        }
    }
}

impl AsyncRead for RedactedStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.chunk.len() {
                let n = buf.remaining().min(this.chunk.len() - this.pos);
                buf.put_slice(&this.chunk[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Err(e));
                }
                None => {
                    this.done = true;
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

/// The producer side of a redaction stage.
pub struct StreamWriter {
    tx: mpsc::Sender<Chunk>,
}

impl StreamWriter {
    /// Fails with `BrokenPipe` once the consumer has gone away.
    pub async fn write(&self, bytes: Vec<u8>) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Ok(bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "redacted stream was closed"))
    }

    /// Writes `line`, followed by `\n` only if the source line had one.
    pub async fn write_line(&self, line: &[u8], had_newline: bool) -> io::Result<()> {
        let mut out = Vec::with_capacity(line.len() + 1);
        out.extend_from_slice(line);
        if had_newline {
            out.push(b'\n');
        }
        self.write(out).await
    }
}

/// Runs `producer` on a new task and returns the stream it writes to.
///
/// An error returned by the producer is delivered to the consumer after
/// everything written before it. Must be called within a tokio runtime.
pub fn spawn_producer<F, Fut>(producer: F) -> ByteStream
where
    F: FnOnce(StreamWriter) -> Fut,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = producer(StreamWriter { tx: tx.clone() });

    tokio::spawn(async move {
        if let Err(e) = task.await {
            if tx.is_closed() {
                debug!("Redaction producer stopped: consumer closed the stream ({}).", e);
            } else {
                let _ = tx.send(Err(e)).await;
            }
        }
    });

    Box::pin(RedactedStream::new(rx))
}

/// Wraps an in-memory buffer as a [`ByteStream`].
pub fn stream_from_bytes(bytes: Vec<u8>) -> ByteStream {
    Box::pin(io::Cursor::new(bytes))
}
