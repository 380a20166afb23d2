//! Transport module - TCP socket handling.
//!
//! Provides:
//! - [`Endpoint`] - host and port of the server
//! - [`connect`] - open a socket with Nagle's algorithm disabled

mod tcp;

pub use tcp::{connect, Endpoint};
