use std::fmt;
use std::sync::Arc;

use relaybus_port::MessagePort;

/// A delivery destination paired with the origin restriction applied when
/// posting to it.
///
/// The restriction travels with the target, not the port: the same port can
/// appear twice with different restrictions, and each entry filters
/// independently.
#[derive(Clone)]
pub struct PortTarget {
    port: Arc<dyn MessagePort>,
    target_origin: String,
}

impl PortTarget {
    pub fn new(port: Arc<dyn MessagePort>, target_origin: impl Into<String>) -> Self {
        Self {
            port,
            target_origin: target_origin.into(),
        }
    }

    /// A target that accepts any peer origin.
    pub fn unrestricted(port: Arc<dyn MessagePort>) -> Self {
        Self::new(port, "*")
    }

    pub fn port(&self) -> &Arc<dyn MessagePort> {
        &self.port
    }

    pub fn target_origin(&self) -> &str {
        &self.target_origin
    }

    /// Posts `message` to this target under its origin restriction.
    pub fn post(&self, message: &serde_json::Value) {
        self.port.post(message, &self.target_origin);
    }
}

/// Whether two handles refer to the same port instance.
pub(crate) fn same_port(a: &Arc<dyn MessagePort>, b: &Arc<dyn MessagePort>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for PortTarget {
    fn eq(&self, other: &Self) -> bool {
        same_port(&self.port, &other.port) && self.target_origin == other.target_origin
    }
}

impl fmt::Debug for PortTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortTarget")
            .field("port", &Arc::as_ptr(&self.port))
            .field("target_origin", &self.target_origin)
            .finish()
    }
}
