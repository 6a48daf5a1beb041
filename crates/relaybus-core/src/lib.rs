//! In-process publish/subscribe event bus with schema-validated dispatch.
//!
//! Handlers are ordered per event key and compared by identity; lifecycle
//! hooks observe subscribe/unsubscribe/dispatch across all keys. Validation
//! errors come from [`relaybus_schema`] unchanged: `UnknownEvent` for a key
//! the registry does not know, `PayloadInvalid` for a rejected payload.

pub mod bus;
pub mod handler;
pub mod hooks;

pub use bus::EventBus;
pub use handler::{handler, Handler};
pub use hooks::{DispatchHook, SubscribeHook, UnsubscribeHook};
pub use relaybus_schema::{Result, SchemaError};
