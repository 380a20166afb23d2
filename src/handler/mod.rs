//! Handler module - correlation of replies to pending requests.
//!
//! Provides:
//! - [`CorrelationId`] - 16-byte token linking a request to its replies
//! - [`CorrelationRegistry`] - maps correlation ids to pending handlers
//! - [`ResponseHandler`] - single-shot channel or persistent callback
//! - [`Reply`] - decoded response, push or rejection handed to a handler

mod correlation;
mod registry;
mod reply;

pub use correlation::CorrelationId;
pub use registry::{Callback, CorrelationRegistry, ResponseHandler};
pub use reply::Reply;
