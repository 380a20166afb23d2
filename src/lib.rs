//! # tcpeventstore
//!
//! Async client for the Event Store TCP protocol.
//!
//! One [`Connection`] multiplexes appends, reads and live subscriptions over
//! a single socket. Every frame carries a 16-byte correlation id; replies and
//! subscription pushes are routed back to the caller that issued the request.
//!
//! ## Architecture
//!
//! - **Protocol**: 4-byte little-endian length prefix, 18-byte header
//!   (command, auth flag, correlation id), protobuf payload
//! - **Writer task**: sole writer of the socket, drains a FIFO queue
//! - **Reader task**: sole reader of the socket, answers heartbeats and
//!   dispatches replies through the correlation registry
//! - **Supervisor**: reconnects after the socket is lost until closed
//!
//! ## Example
//!
//! ```no_run
//! use tcpeventstore::{Connection, EventData, ExpectedVersion, Reply};
//!
//! #[tokio::main]
//! async fn main() -> tcpeventstore::Result<()> {
//!     let connection = Connection::builder("127.0.0.1", 1113).build();
//!     connection.connect().await?;
//!
//!     let event = EventData::json("Test", &serde_json::json!({ "n": 1 }))?;
//!     match connection
//!         .append_to_stream("test", ExpectedVersion::Any, &[event])
//!         .await?
//!     {
//!         Reply::WriteCompleted(done) => println!("written: {}", done.is_success()),
//!         other => println!("unexpected: {:?}", other),
//!     }
//!
//!     connection.close().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod event;
pub mod handler;
pub mod messages;
pub mod protocol;
pub mod transport;

mod client;
mod reader;
mod shutdown;
mod writer;

pub use client::{ClientBuilder, Connection, ConnectionState, DEFAULT_RECONNECT_DELAY};
pub use error::{EventStoreError, Result};
pub use event::{EventData, ExpectedVersion, StreamPosition};
pub use handler::{CorrelationId, Reply};
