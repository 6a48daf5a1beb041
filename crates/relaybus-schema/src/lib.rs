//! JSON Schema validation for event payloads.
//!
//! Maps event keys to compiled JSON Schema 2020-12 validators. The registry is
//! the contract for an event bus: a key absent from the registry does not
//! exist as an event, and validation failures report every violation with its
//! JSON Pointer location.

pub mod config;
pub mod error;
pub mod registry;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError, Violation};
pub use registry::SchemaRegistry;
