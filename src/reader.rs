//! Reader task: reassembles inbound frames and dispatches them.
//!
//! One reader runs per connection generation. It is the only task reading
//! the socket and the only one invoking reply handlers, so handlers for a
//! given correlation id always run in wire order.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::error::{EventStoreError, Result};
use crate::handler::{CorrelationRegistry, Reply};
use crate::protocol::{Frame, FrameBuffer, TcpCommand, DEFAULT_MAX_FRAME_SIZE};
use crate::shutdown::ShutdownListener;
use crate::writer::WriteQueue;

/// Default socket receive chunk size.
pub(crate) const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Settings for one reader task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReaderConfig {
    pub max_frame_size: u32,
    pub read_buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Spawn the reader task for one connection generation.
///
/// The task resolves to `Ok(())` only when shut down; any other exit,
/// including the peer closing the socket, is an error.
pub(crate) fn spawn_reader_task<R>(
    reader: R,
    registry: Arc<CorrelationRegistry>,
    queue: Arc<WriteQueue>,
    shutdown: ShutdownListener,
    config: ReaderConfig,
) -> JoinHandle<Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // tokio::spawn does not carry the caller's scoped dispatcher along
    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    tokio::spawn(read_loop(reader, registry, queue, shutdown, config).with_subscriber(dispatch))
}

/// Main read loop - reads frames and dispatches them to handlers.
pub(crate) async fn read_loop<R>(
    mut reader: R,
    registry: Arc<CorrelationRegistry>,
    queue: Arc<WriteQueue>,
    mut shutdown: ShutdownListener,
    config: ReaderConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_frame_size(config.max_frame_size);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];

    loop {
        let n = tokio::select! {
            biased;
            _ = shutdown.wait() => return Ok(()),
            read = reader.read(&mut buf) => read?,
        };

        if n == 0 {
            return Err(EventStoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }

        for frame in frame_buffer.push(&buf[..n])? {
            dispatch_frame(frame, &registry, &queue);
        }
        if let Some(e) = frame_buffer.take_error() {
            return Err(e);
        }
    }
}

/// Dispatch a single inbound frame.
pub(crate) fn dispatch_frame(frame: Frame, registry: &CorrelationRegistry, queue: &WriteQueue) {
    let id = frame.correlation_id();

    let command = match frame.command() {
        Some(command) => command,
        None => {
            tracing::info!(
                "Command 0x{:02X} is not supported, dropping frame {}",
                frame.command_byte(),
                id
            );
            return;
        }
    };

    tracing::debug!("Received {} for {} ({} bytes)", command, id, frame.payload().len());

    if command == TcpCommand::HeartbeatRequest {
        match Frame::heartbeat_response(id).encode() {
            Ok(wire) => queue.push(wire),
            Err(e) => tracing::error!("Failed to encode heartbeat response for {}: {}", id, e),
        }
        return;
    }

    if !command.is_dispatchable() {
        tracing::info!("Command {} is not supported, dropping frame {}", command, id);
        return;
    }

    let handler = match registry.resolve(&id, command.is_terminal()) {
        Some(handler) => handler,
        None => {
            tracing::info!("No handler registered for {}, dropping {}", id, command);
            return;
        }
    };

    let reply = Reply::decode(command, frame.payload()).unwrap_or_else(|e| {
        tracing::error!("Failed to decode {} for {}: {}", command, id, e);
        Reply::Malformed {
            command,
            error: e.to_string(),
        }
    });

    handler.deliver(reply);
}
