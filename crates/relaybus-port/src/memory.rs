use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use crate::traits::{lock, origin_allowed, ListenerSet, MessageListener, MessagePort};

/// In-memory message fabric connecting any number of ports.
///
/// Models postMessage-style delivery without a real process boundary: `post`
/// enqueues, nothing is handed to listeners until [`MemoryHub::pump`] runs.
/// One hub stands in for the host's event loop; tests and demos drive it
/// explicitly, which makes delivery order observable and deterministic.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    queue: Mutex<VecDeque<Queued>>,
}

struct Queued {
    target: Weak<MemoryPort>,
    target_origin: String,
    message: Value,
}

/// A hub endpoint. Obtained from [`MemoryHub::create_port`]; the `Arc` handle
/// doubles as the destination address other participants post to.
pub struct MemoryPort {
    origin: String,
    hub: Weak<HubInner>,
    self_ref: Weak<MemoryPort>,
    listeners: ListenerSet,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                queue: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Create a port with the given origin.
    pub fn create_port(&self, origin: impl Into<String>) -> Arc<MemoryPort> {
        let origin = origin.into();
        let hub = Arc::downgrade(&self.inner);
        Arc::new_cyclic(|self_ref| MemoryPort {
            origin,
            hub,
            self_ref: self_ref.clone(),
            listeners: ListenerSet::new(),
        })
    }

    /// Deliver queued messages until the queue is empty.
    ///
    /// Messages enqueued by listeners during the pump are drained in the same
    /// call. Returns the number of messages handed to a port's listeners; a
    /// message filtered by its destination restriction or addressed to a
    /// dropped port is discarded and not counted.
    pub fn pump(&self) -> usize {
        let mut delivered = 0usize;
        loop {
            let next = lock(&self.inner.queue).pop_front();
            let Some(queued) = next else { break };

            let Some(port) = queued.target.upgrade() else {
                debug!("target port dropped; message discarded");
                continue;
            };
            if !origin_allowed(&queued.target_origin, &port.origin) {
                debug!(
                    restriction = %queued.target_origin,
                    origin = %port.origin,
                    "destination restriction filtered message"
                );
                continue;
            }

            for listener in port.listeners.snapshot() {
                if let Err(error) = listener(&queued.message) {
                    warn!(%error, origin = %port.origin, "listener failed handling message");
                }
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of messages waiting for the next pump.
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).len()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPort {
    /// The origin this port was created with.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl MessagePort for MemoryPort {
    fn post(&self, message: &Value, target_origin: &str) {
        let Some(hub) = self.hub.upgrade() else {
            debug!(origin = %self.origin, "hub dropped; message discarded");
            return;
        };
        lock(&hub.queue).push_back(Queued {
            target: self.self_ref.clone(),
            target_origin: target_origin.to_string(),
            message: message.clone(),
        });
    }

    fn add_listener(&self, listener: MessageListener) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &MessageListener) {
        self.listeners.remove(listener);
    }
}
