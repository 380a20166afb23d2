//! Write queue and the dedicated writer task.
//!
//! Every outbound frame is encoded by its producer and pushed onto one
//! [`WriteQueue`]. A single writer task per connection generation pops
//! buffers and writes each one fully before taking the next, so the socket
//! sees frames in enqueue order and never interleaved.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ───┐
//! Caller 2 ───┼─► WriteQueue ─► Writer Task ─► TcpStream
//! Reader task ┘   (heartbeats)
//! ```
//!
//! The queue belongs to the connection, not to a socket. When a write fails
//! the buffer goes back to the front of the queue and the task ends; the
//! writer started after reconnection writes it first.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::error::Result;
use crate::shutdown::ShutdownListener;

/// Multi-producer, single-consumer FIFO of encoded frames.
#[derive(Debug, Default)]
pub struct WriteQueue {
    items: Mutex<VecDeque<Bytes>>,
    notify: Notify,
}

impl WriteQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer. Never blocks.
    pub fn push(&self, buf: Bytes) {
        self.items.lock().push_back(buf);
        self.notify.notify_one();
    }

    /// Put a buffer back at the head, ahead of everything queued.
    pub fn push_front(&self, buf: Bytes) {
        self.items.lock().push_front(buf);
        self.notify.notify_one();
    }

    /// Take the head buffer if there is one.
    pub fn try_pop(&self) -> Option<Bytes> {
        self.items.lock().pop_front()
    }

    /// Wait for and take the head buffer.
    ///
    /// Cancel safe: a buffer is only removed once this future completes.
    pub async fn pop(&self) -> Bytes {
        loop {
            if let Some(buf) = self.try_pop() {
                return buf;
            }
            self.notify.notified().await;
        }
    }

    /// Number of queued buffers.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Keep only the buffers for which `keep` returns true.
    ///
    /// Returns how many buffers were removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&Bytes) -> bool,
    {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|buf| keep(buf));
        before - items.len()
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

/// Spawn the writer task for one connection generation.
///
/// # Returns
///
/// The JoinHandle resolves to `Ok(())` after shutdown and to the I/O error
/// that ended the task otherwise.
pub(crate) fn spawn_writer_task<W>(
    writer: W,
    queue: Arc<WriteQueue>,
    shutdown: ShutdownListener,
) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    // tokio::spawn does not carry the caller's scoped dispatcher along
    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    tokio::spawn(writer_loop(writer, queue, shutdown).with_subscriber(dispatch))
}

/// Main writer loop - pops buffers and writes them to the socket.
pub(crate) async fn writer_loop<W>(
    mut writer: W,
    queue: Arc<WriteQueue>,
    mut shutdown: ShutdownListener,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let buf = tokio::select! {
            biased;
            _ = shutdown.wait() => return Ok(()),
            buf = queue.pop() => buf,
        };

        let written = tokio::select! {
            biased;
            _ = shutdown.wait() => None,
            result = write_frame(&mut writer, &buf) => Some(result),
        };

        match written {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::error!("Write failed, {} bytes re-queued: {}", buf.len(), e);
                queue.push_front(buf);
                return Err(e.into());
            }
            None => {
                // may be partially written; the next connection gets all of it
                queue.push_front(buf);
                return Ok(());
            }
        }
    }
}

async fn write_frame<W>(writer: &mut W, buf: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(buf).await?;
    writer.flush().await
}
