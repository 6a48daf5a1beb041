use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

/// Error raised by a message listener while handling one inbound message.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of handing one inbound message to a listener.
///
/// An `Err` aborts processing of that single message only; the port logs it
/// and keeps delivering.
pub type DeliveryResult = std::result::Result<(), ListenerError>;

/// Callback invoked with each inbound message on a port.
///
/// Listeners are compared by `Arc` data pointer for removal, so clones of one
/// listener are the same registration.
pub type MessageListener = Arc<dyn Fn(&Value) -> DeliveryResult + Send + Sync>;

/// A handle to a message-receiving endpoint.
///
/// `post` is addressed like `window.postMessage`: the port is the
/// *destination*, and `target_origin` restricts which receiving origin may
/// accept the message (`"*"` disables the restriction). Delivery is
/// fire-and-forget; a message filtered out or lost in transit surfaces
/// nowhere but the log.
pub trait MessagePort: Send + Sync {
    /// Send a message toward this endpoint, subject to the origin restriction.
    fn post(&self, message: &Value, target_origin: &str);

    /// Register a listener for messages arriving at this endpoint.
    fn add_listener(&self, listener: MessageListener);

    /// Remove a previously registered listener (by identity). Unknown
    /// listeners are a no-op.
    fn remove_listener(&self, listener: &MessageListener);
}

/// Listener identity check: same `Arc` allocation, not same code.
pub fn same_listener(a: &MessageListener, b: &MessageListener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn origin_allowed(restriction: &str, origin: &str) -> bool {
    restriction == "*" || restriction == origin
}

/// Shared listener bookkeeping for port implementations.
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<MessageListener>>,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: MessageListener) {
        lock(&self.listeners).push(listener);
    }

    pub(crate) fn remove(&self, listener: &MessageListener) {
        lock(&self.listeners).retain(|registered| !same_listener(registered, listener));
    }

    pub(crate) fn snapshot(&self) -> Vec<MessageListener> {
        lock(&self.listeners).clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.listeners).len()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
