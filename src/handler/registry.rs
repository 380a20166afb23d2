//! Correlation registry for dispatching replies by correlation id.
//!
//! The registry is owned by one connection and shared between the caller
//! side (registering handlers before a frame is queued) and the reader task
//! (looking up and removing them as replies arrive). It is backed by a
//! `DashMap`, so neither side takes a lock of its own.
//!
//! # Example
//!
//! ```
//! use tcpeventstore::handler::{CorrelationId, CorrelationRegistry, ResponseHandler};
//! use tcpeventstore::Reply;
//!
//! let registry = CorrelationRegistry::new();
//! let id = CorrelationId::new();
//!
//! let (handler, mut rx) = ResponseHandler::once();
//! registry.register(id, handler);
//!
//! // A terminal reply removes the entry and completes the caller.
//! registry.resolve(&id, true).unwrap().deliver(Reply::Disconnected);
//! assert!(registry.is_empty());
//! assert_eq!(rx.try_recv().unwrap(), Reply::Disconnected);
//! ```

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;

use super::{CorrelationId, Reply};

/// A persistent reply handler, invoked on the reader task.
pub type Callback = Arc<dyn Fn(Reply) + Send + Sync + 'static>;

/// What to do with the reply for one correlation id.
pub enum ResponseHandler {
    /// Single-shot channel that unblocks exactly one waiting caller.
    Once(oneshot::Sender<Reply>),
    /// Caller-supplied callback for a request/response command.
    Callback(Callback),
    /// Caller-supplied callback for a live subscription; may fire many times.
    Subscription(Callback),
}

impl ResponseHandler {
    /// Create a single-shot handler and the receiver the caller waits on.
    pub fn once() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (ResponseHandler::Once(tx), rx)
    }

    /// Wrap a callback for a request/response command.
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        ResponseHandler::Callback(Arc::new(callback))
    }

    /// Wrap a callback for a subscription.
    pub fn subscription<F>(callback: F) -> Self
    where
        F: Fn(Reply) + Send + Sync + 'static,
    {
        ResponseHandler::Subscription(Arc::new(callback))
    }

    /// Hand a reply to this handler.
    ///
    /// A single-shot handler whose caller has gone away drops the reply.
    pub fn deliver(self, reply: Reply) {
        match self {
            ResponseHandler::Once(tx) => {
                let _ = tx.send(reply);
            }
            ResponseHandler::Callback(callback) | ResponseHandler::Subscription(callback) => {
                callback(reply)
            }
        }
    }

    /// Give up on an exchange that will never complete.
    ///
    /// A waiting single-shot caller sees its channel close; callbacks
    /// receive [`Reply::Disconnected`].
    pub fn abandon(self) {
        if let ResponseHandler::Once(_) = self {
            return;
        }
        self.deliver(Reply::Disconnected);
    }

    /// Check if this handler belongs to a subscription.
    pub fn is_subscription(&self) -> bool {
        matches!(self, ResponseHandler::Subscription(_))
    }

    /// Cheap copy of a persistent handler; `None` for single-shot ones.
    fn share(&self) -> Option<Self> {
        match self {
            ResponseHandler::Once(_) => None,
            ResponseHandler::Callback(callback) => {
                Some(ResponseHandler::Callback(callback.clone()))
            }
            ResponseHandler::Subscription(callback) => {
                Some(ResponseHandler::Subscription(callback.clone()))
            }
        }
    }
}

impl fmt::Debug for ResponseHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ResponseHandler::Once(_) => "Once",
            ResponseHandler::Callback(_) => "Callback",
            ResponseHandler::Subscription(_) => "Subscription",
        };
        f.write_str(kind)
    }
}

/// Registry mapping correlation ids to pending handlers.
#[derive(Default)]
pub struct CorrelationRegistry {
    entries: DashMap<CorrelationId, ResponseHandler>,
}

impl CorrelationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced if any.
    pub fn register(&self, id: CorrelationId, handler: ResponseHandler) -> Option<ResponseHandler> {
        self.entries.insert(id, handler)
    }

    /// Look up the persistent callback registered for `id`.
    ///
    /// Single-shot entries are not shareable and report `None`.
    pub fn lookup(&self, id: &CorrelationId) -> Option<Callback> {
        match self.entries.get(id)?.value() {
            ResponseHandler::Once(_) => None,
            ResponseHandler::Callback(callback) | ResponseHandler::Subscription(callback) => {
                Some(callback.clone())
            }
        }
    }

    /// Check if a handler is registered for `id`.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return the handler for `id`.
    pub fn remove(&self, id: &CorrelationId) -> Option<ResponseHandler> {
        self.entries.remove(id).map(|(_, handler)| handler)
    }

    /// Fetch the handler that should receive the next reply for `id`.
    ///
    /// Terminal replies remove the entry. Non-terminal replies leave
    /// persistent handlers in place; a single-shot handler is always
    /// consumed since it can only fire once.
    pub fn resolve(&self, id: &CorrelationId, terminal: bool) -> Option<ResponseHandler> {
        if !terminal {
            let shared = self.entries.get(id)?.share();
            if shared.is_some() {
                return shared;
            }
        }
        self.remove(id)
    }

    /// Remove every subscription handler, paired with its token.
    pub fn drain_subscriptions(&self) -> Vec<(CorrelationId, ResponseHandler)> {
        let ids: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_subscription())
            .map(|entry| *entry.key())
            .collect();

        ids.into_iter()
            .filter_map(|id| self.remove(&id).map(|handler| (id, handler)))
            .collect()
    }

    /// Remove every handler.
    pub fn drain(&self) -> Vec<ResponseHandler> {
        let ids: Vec<CorrelationId> = self.entries.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.entries.len())
            .finish()
    }
}
