//! Peer-to-peer event relaying over message ports.
//!
//! A [`RelayBus`] couples a local schema-validated event bus to a message
//! port: outbound dispatches are enveloped and fanned out to target ports,
//! inbound envelopes are validated and delivered to local subscribers. A
//! parent relay re-broadcasts inbound traffic to its targets, which is how a
//! hub-and-spoke topology propagates an event from one leaf to all others.
//! Every instance stamps its envelopes with a unique identifier and drops
//! envelopes carrying its own, so re-broadcast cannot loop.

mod envelope;
mod error;
mod identity;
mod relay;
mod target;

pub use envelope::{Envelope, Role};
pub use error::{RelayError, Result};
pub use identity::{AlphanumericIdSource, FixedIdSource, InstanceIdSource, SecureIdSource};
pub use relay::{RelayBus, RelayOptions};
pub use target::PortTarget;

// Surface the types that appear in this crate's own signatures.
pub use relaybus_core::{handler, DispatchHook, Handler, SubscribeHook, UnsubscribeHook};
pub use relaybus_port::MessagePort;
