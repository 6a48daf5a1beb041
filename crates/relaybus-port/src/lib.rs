//! Message port capability for cross-endpoint event relays.
//!
//! A [`MessagePort`] is a handle to a receiving endpoint, addressed the way
//! `window.postMessage` is: post toward the handle, restrict by destination
//! origin, listen for what arrives at your own. Two transports are provided:
//! an in-memory hub for single-process wiring and tests, and a framed
//! Unix-domain-socket port for real process boundaries.

pub mod codec;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{PortError, Result};
pub use memory::{MemoryHub, MemoryPort};
pub use traits::{same_listener, DeliveryResult, ListenerError, MessageListener, MessagePort};

#[cfg(unix)]
pub use uds::{UdsListener, UdsPort};
