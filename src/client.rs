//! Client builder, connection lifecycle and command API.
//!
//! The [`ClientBuilder`] configures a [`Connection`]. The connection manages
//! its lifecycle:
//! 1. Open the socket (`connect`)
//! 2. Spawn the reader and writer tasks for this connection generation
//! 3. When either task fails, close the socket and retry every
//!    `reconnect_delay` until connected again or closed
//! 4. `close` stops the tasks and releases every pending handler
//!
//! # Example
//!
//! ```no_run
//! use tcpeventstore::{ClientBuilder, EventData, ExpectedVersion, Reply};
//!
//! #[tokio::main]
//! async fn main() -> tcpeventstore::Result<()> {
//!     let connection = ClientBuilder::new("127.0.0.1", 1113).build();
//!     connection.connect().await?;
//!
//!     let token = connection.subscribe_to_stream("test", |reply| {
//!         if let Reply::EventAppeared(appeared) = reply {
//!             println!("{:?}", appeared);
//!         }
//!     })?;
//!
//!     let event = EventData::json("Test", &serde_json::json!({}))?;
//!     let reply = connection
//!         .append_to_stream("test", ExpectedVersion::Any, &[event])
//!         .await?;
//!     println!("{:?}", reply);
//!
//!     connection.unsubscribe_from_stream(token)?;
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use crate::codec::ProtobufCodec;
use crate::error::{EventStoreError, Result};
use crate::event::{EventData, ExpectedVersion};
use crate::handler::{Callback, CorrelationId, CorrelationRegistry, Reply, ResponseHandler};
use crate::messages::{
    NewEvent, ReadStreamEvents, SubscribeToStream, UnsubscribeFromStream, WriteEvents,
};
use crate::protocol::{Frame, TcpCommand};
use crate::reader::{spawn_reader_task, ReaderConfig};
use crate::shutdown::{shutdown_channel, ShutdownListener, ShutdownTrigger};
use crate::transport::{self, Endpoint};
use crate::writer::{spawn_writer_task, WriteQueue};

/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Builder for configuring and creating a [`Connection`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    endpoint: Endpoint,
    reconnect_delay: Duration,
    reader_config: ReaderConfig,
    logger: Option<Dispatch>,
}

impl ClientBuilder {
    /// Create a builder for the server at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint::new(host, port),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reader_config: ReaderConfig::default(),
            logger: None,
        }
    }

    /// Set the pause between reconnect attempts.
    ///
    /// Default: 3 seconds
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the largest length prefix accepted from the server.
    ///
    /// Default: 64MB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.reader_config.max_frame_size = size;
        self
    }

    /// Set the socket receive chunk size.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.reader_config.read_buffer_size = size;
        self
    }

    /// Route this connection's log output to `dispatch`.
    ///
    /// Without one, the global subscriber is used if the application
    /// installed one; otherwise only errors are printed.
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    /// Build an unconnected [`Connection`].
    pub fn build(self) -> Connection {
        let dispatch = self.logger.or_else(|| {
            if tracing::dispatcher::has_been_set() {
                None
            } else {
                Some(default_logger())
            }
        });
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Connection {
            inner: Arc::new(Inner {
                endpoint: self.endpoint,
                reconnect_delay: self.reconnect_delay,
                reader_config: self.reader_config,
                dispatch,
                registry: Arc::new(CorrelationRegistry::new()),
                queue: Arc::new(WriteQueue::new()),
                state,
                open: AtomicBool::new(true),
                supervisor: Mutex::new(None),
            }),
        }
    }
}

/// Error-level stderr sink used when nothing else is configured.
fn default_logger() -> Dispatch {
    Dispatch::new(
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("error"))
            .finish(),
    )
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket. Either never connected or waiting to reconnect.
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// Reader and writer tasks are running.
    Connected,
    /// `close` was called. Terminal; the connection never reopens.
    Closing,
}

struct Supervisor {
    handle: JoinHandle<()>,
    shutdown: ShutdownTrigger,
}

struct Inner {
    endpoint: Endpoint,
    reconnect_delay: Duration,
    reader_config: ReaderConfig,
    dispatch: Option<Dispatch>,
    registry: Arc<CorrelationRegistry>,
    queue: Arc<WriteQueue>,
    state: watch::Sender<ConnectionState>,
    /// Cleared by `close`; nothing reconnects or sends afterwards.
    open: AtomicBool,
    supervisor: Mutex<Option<Supervisor>>,
}

impl Inner {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Run `f` with this connection's logger as the default dispatcher.
    fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Move from `from` to `to`, leaving any other state untouched.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Subscriptions die with the socket; one-shot requests stay pending.
    ///
    /// Queued frames addressed to a dropped subscription and heartbeat
    /// answers for the old socket are discarded, so nothing the server
    /// would tie to the lost connection is written on the next one.
    fn connection_lost(&self) {
        self.transition(ConnectionState::Connected, ConnectionState::Disconnected);
        let dropped = self.registry.drain_subscriptions();
        let tokens: HashSet<CorrelationId> = dropped.iter().map(|(id, _)| *id).collect();

        let discarded = self.queue.retain(|wire| match Frame::peek_header(wire) {
            Some(header) => {
                header.command != TcpCommand::HeartbeatResponse.as_u8()
                    && !tokens.contains(&CorrelationId::from_bytes(header.correlation_id))
            }
            None => true,
        });
        if discarded > 0 {
            tracing::debug!("Discarded {} queued frames of the lost connection", discarded);
        }

        if !dropped.is_empty() {
            tracing::info!("Dropping {} subscriptions", dropped.len());
        }
        for (_, handler) in dropped {
            handler.abandon();
        }
    }
}

/// A multiplexed connection to one server.
///
/// Cheap to clone; clones share the socket, queue and registry. Call
/// [`Connection::close`] to stop the background tasks.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a builder for the server at `host:port`.
    pub fn builder(host: impl Into<String>, port: u16) -> ClientBuilder {
        ClientBuilder::new(host, port)
    }

    /// Open the socket and start the reader and writer tasks.
    ///
    /// Succeeds without doing anything if already connected.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::Connect`] if the socket cannot be opened; nothing
    ///   is started and the caller may retry.
    /// - [`EventStoreError::ConnectInProgress`] while another attempt or the
    ///   reconnect loop is opening the socket.
    /// - [`EventStoreError::ConnectionClosed`] after [`Connection::close`].
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let supervisor = inner.supervisor.lock();
            if !inner.is_open() {
                return Err(EventStoreError::ConnectionClosed);
            }
            if supervisor.is_some() {
                return match self.state() {
                    ConnectionState::Connected => Ok(()),
                    _ => Err(EventStoreError::ConnectInProgress),
                };
            }
            if !inner.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
                return Err(EventStoreError::ConnectInProgress);
            }
        }

        inner.in_scope(|| tracing::info!("Connecting to {}", inner.endpoint));
        let stream = match transport::connect(&inner.endpoint).await {
            Ok(stream) => stream,
            Err(e) => {
                inner.in_scope(|| tracing::error!("{}", e));
                inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let mut supervisor = inner.supervisor.lock();
        if !inner.is_open() {
            return Err(EventStoreError::ConnectionClosed);
        }

        let (trigger, listener) = shutdown_channel();
        inner.transition(ConnectionState::Connecting, ConnectionState::Connected);
        let (read_half, write_half) = stream.into_split();
        let task = supervise(inner.clone(), read_half, write_half, listener);
        let handle = match &inner.dispatch {
            Some(dispatch) => tokio::spawn(task.with_subscriber(dispatch.clone())),
            None => tokio::spawn(task),
        };
        *supervisor = Some(Supervisor {
            handle,
            shutdown: trigger,
        });
        Ok(())
    }

    /// Close the connection for good.
    ///
    /// Stops reconnecting, closes the socket and waits for the background
    /// tasks. Pending synchronous calls fail with
    /// [`EventStoreError::ConnectionClosed`]; callbacks and subscriptions
    /// receive [`Reply::Disconnected`]. Unsent frames are discarded.
    pub async fn close(&self) {
        let inner = &self.inner;
        let supervisor = {
            let mut supervisor = inner.supervisor.lock();
            inner.open.store(false, Ordering::SeqCst);
            inner.state.send_replace(ConnectionState::Closing);
            supervisor.take()
        };

        if let Some(supervisor) = supervisor {
            supervisor.shutdown.trigger();
            if let Err(e) = supervisor.handle.await {
                inner.in_scope(|| tracing::error!("Connection supervisor failed: {}", e));
            }
        }

        inner.queue.clear();
        for handler in inner.registry.drain() {
            handler.abandon();
        }
        inner.in_scope(|| tracing::info!("Connection to {} closed", inner.endpoint));
    }

    /// Check if the socket is open and the tasks are running.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Server address.
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Number of correlation ids still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of encoded frames not yet written.
    pub fn queued_frames(&self) -> usize {
        self.inner.queue.len()
    }

    /// Append events and wait for the result.
    pub async fn append_to_stream(
        &self,
        stream: &str,
        expected_version: impl Into<ExpectedVersion>,
        events: &[EventData],
    ) -> Result<Reply> {
        let payload = append_payload(stream, expected_version.into(), events);
        self.request(TcpCommand::WriteEvents, payload).await
    }

    /// Append events; `callback` receives the result on the reader task.
    pub fn append_to_stream_with<F>(
        &self,
        stream: &str,
        expected_version: impl Into<ExpectedVersion>,
        events: &[EventData],
        callback: F,
    ) -> Result<CorrelationId>
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        let payload = append_payload(stream, expected_version.into(), events);
        self.request_with(TcpCommand::WriteEvents, payload, callback)
    }

    /// Read up to `max_count` events starting at `start`, oldest first.
    pub async fn read_stream_events_forward(
        &self,
        stream: &str,
        start: i64,
        max_count: i32,
    ) -> Result<Reply> {
        let payload = read_payload(stream, start, max_count);
        self.request(TcpCommand::ReadStreamEventsForward, payload)
            .await
    }

    /// Forward read delivering the result to `callback`.
    pub fn read_stream_events_forward_with<F>(
        &self,
        stream: &str,
        start: i64,
        max_count: i32,
        callback: F,
    ) -> Result<CorrelationId>
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        let payload = read_payload(stream, start, max_count);
        self.request_with(TcpCommand::ReadStreamEventsForward, payload, callback)
    }

    /// Read up to `max_count` events starting at `start`, newest first.
    ///
    /// Use [`StreamPosition::END`](crate::StreamPosition::END) to start
    /// from the last event.
    pub async fn read_stream_events_backward(
        &self,
        stream: &str,
        start: i64,
        max_count: i32,
    ) -> Result<Reply> {
        let payload = read_payload(stream, start, max_count);
        self.request(TcpCommand::ReadStreamEventsBackward, payload)
            .await
    }

    /// Backward read delivering the result to `callback`.
    pub fn read_stream_events_backward_with<F>(
        &self,
        stream: &str,
        start: i64,
        max_count: i32,
        callback: F,
    ) -> Result<CorrelationId>
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        let payload = read_payload(stream, start, max_count);
        self.request_with(TcpCommand::ReadStreamEventsBackward, payload, callback)
    }

    /// Subscribe to live events on `stream`.
    ///
    /// `callback` receives the confirmation, every appeared event and finally
    /// the drop notification. The returned id is the handle for
    /// [`Connection::unsubscribe_from_stream`].
    pub fn subscribe_to_stream<F>(&self, stream: &str, callback: F) -> Result<CorrelationId>
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        self.subscribe_with_callback(stream, Some(Arc::new(callback)))
    }

    /// Subscribe with an optional, already shared callback.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::MissingCallback`] without sending anything
    /// if `callback` is `None`.
    pub fn subscribe_with_callback(
        &self,
        stream: &str,
        callback: Option<Callback>,
    ) -> Result<CorrelationId> {
        let callback = callback.ok_or(EventStoreError::MissingCallback)?;
        let payload = ProtobufCodec::encode(&SubscribeToStream {
            event_stream_id: stream.to_string(),
            resolve_link_tos: false,
        });

        let id = CorrelationId::new();
        self.send(
            TcpCommand::SubscribeToStream,
            id,
            payload,
            Some(ResponseHandler::Subscription(callback)),
        )?;
        Ok(id)
    }

    /// End a subscription.
    ///
    /// The request reuses the subscription's id, so the drop notification
    /// reaches the original callback.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::UnknownSubscription`] if no callback is
    /// registered for `id`.
    pub fn unsubscribe_from_stream(&self, id: CorrelationId) -> Result<()> {
        if self.inner.registry.lookup(&id).is_none() {
            return Err(EventStoreError::UnknownSubscription(id));
        }
        let payload = ProtobufCodec::encode(&UnsubscribeFromStream {});
        self.send(TcpCommand::UnsubscribeFromStream, id, payload, None)
    }

    /// Send with a single-shot handler and wait for its reply.
    ///
    /// No timeout is applied here.
    async fn request(&self, command: TcpCommand, payload: Bytes) -> Result<Reply> {
        let id = CorrelationId::new();
        let (handler, rx) = ResponseHandler::once();
        self.send(command, id, payload, Some(handler))?;
        rx.await.map_err(|_| EventStoreError::ConnectionClosed)
    }

    fn request_with<F>(&self, command: TcpCommand, payload: Bytes, callback: F) -> Result<CorrelationId>
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        let id = CorrelationId::new();
        self.send(command, id, payload, Some(ResponseHandler::callback(callback)))?;
        Ok(id)
    }

    /// Register `handler` (if any) and queue the frame.
    ///
    /// The handler is registered before the frame is queued so the reply
    /// can never arrive first.
    fn send(
        &self,
        command: TcpCommand,
        id: CorrelationId,
        payload: Bytes,
        handler: Option<ResponseHandler>,
    ) -> Result<()> {
        let inner = &self.inner;
        if !inner.is_open() {
            return Err(EventStoreError::ConnectionClosed);
        }

        let frame = Frame::new(command, id, payload);
        let wire = frame.encode()?;

        let registered = handler.is_some();
        if let Some(handler) = handler {
            inner.registry.register(id, handler);
        }

        inner.in_scope(|| {
            tracing::debug!("Sending {} for {} ({} bytes)", command, id, frame.payload().len())
        });
        inner.queue.push(wire);

        // lost a race with close(), which has already drained the registry
        if !inner.is_open() {
            if registered {
                inner.registry.remove(&id);
            }
            return Err(EventStoreError::ConnectionClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .field("pending", &self.inner.registry.len())
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}

fn append_payload(stream: &str, expected_version: ExpectedVersion, events: &[EventData]) -> Bytes {
    ProtobufCodec::encode(&WriteEvents {
        event_stream_id: stream.to_string(),
        expected_version: expected_version.as_i64(),
        events: events.iter().map(NewEvent::from).collect(),
        require_master: false,
    })
}

fn read_payload(stream: &str, start: i64, max_count: i32) -> Bytes {
    ProtobufCodec::encode(&ReadStreamEvents {
        event_stream_id: stream.to_string(),
        from_event_number: start,
        max_count,
        resolve_link_tos: false,
        require_master: false,
    })
}

/// Supervisor task: runs connection generations until shut down.
///
/// The first generation runs on the halves handed in by `connect`; later
/// ones on sockets opened by [`reconnect`].
async fn supervise<R, W>(
    inner: Arc<Inner>,
    read_half: R,
    write_half: W,
    mut shutdown: ShutdownListener,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    run_generation(&inner, read_half, write_half, shutdown.clone()).await;
    loop {
        if shutdown.is_triggered() || !inner.is_open() {
            return;
        }

        inner.connection_lost();
        let stream = match reconnect(&inner, &mut shutdown).await {
            Some(stream) => stream,
            None => return,
        };
        inner.transition(ConnectionState::Connecting, ConnectionState::Connected);
        tracing::info!("Reconnected to {}", inner.endpoint);

        let (read_half, write_half) = stream.into_split();
        run_generation(&inner, read_half, write_half, shutdown.clone()).await;
    }
}

/// Run one reader/writer pair until either fails or shutdown fires.
///
/// Both tasks are joined before returning, which drops both socket halves.
async fn run_generation<R, W>(
    inner: &Inner,
    read_half: R,
    write_half: W,
    mut shutdown: ShutdownListener,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (stop, generation) = shutdown_channel();

    let mut reader = spawn_reader_task(
        read_half,
        inner.registry.clone(),
        inner.queue.clone(),
        generation.clone(),
        inner.reader_config,
    );
    let mut writer = spawn_writer_task(write_half, inner.queue.clone(), generation);

    let exit = tokio::select! {
        result = &mut reader => Exit::Reader(result),
        result = &mut writer => Exit::Writer(result),
        _ = shutdown.wait() => Exit::Shutdown,
    };
    stop.trigger();

    match exit {
        Exit::Reader(result) => {
            log_task_exit("Reader", result);
            let _ = writer.await;
        }
        Exit::Writer(result) => {
            log_task_exit("Writer", result);
            let _ = reader.await;
        }
        Exit::Shutdown => {
            let _ = reader.await;
            let _ = writer.await;
        }
    }
}

type TaskResult = std::result::Result<Result<()>, tokio::task::JoinError>;

/// Which side ended a connection generation.
enum Exit {
    Reader(TaskResult),
    Writer(TaskResult),
    Shutdown,
}

fn log_task_exit(task: &str, result: TaskResult) {
    match result {
        Ok(Ok(())) => tracing::debug!("{} task stopped", task),
        Ok(Err(e)) => tracing::info!("Connection lost: {}", e),
        Err(e) => tracing::error!("{} task failed: {}", task, e),
    }
}

/// Retry opening the socket every `reconnect_delay`.
///
/// Returns `None` if shut down first.
async fn reconnect(inner: &Inner, shutdown: &mut ShutdownListener) -> Option<TcpStream> {
    loop {
        tokio::select! {
            _ = shutdown.wait() => return None,
            _ = tokio::time::sleep(inner.reconnect_delay) => {}
        }

        inner.transition(ConnectionState::Disconnected, ConnectionState::Connecting);
        tracing::info!("Connecting to {}", inner.endpoint);

        let attempt = tokio::select! {
            _ = shutdown.wait() => return None,
            attempt = transport::connect(&inner.endpoint) => attempt,
        };
        match attempt {
            Ok(stream) => return Some(stream),
            Err(e) => {
                tracing::error!("{}", e);
                inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
            }
        }
    }
}
