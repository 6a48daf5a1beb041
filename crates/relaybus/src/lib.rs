//! Schema-validated event bus with cross-endpoint relaying.
//!
//! relaybus couples a JSON Schema registry to an in-process event bus and
//! relays validated events across endpoint boundaries over postMessage-style
//! ports: in-memory hubs for tests and demos, Unix domain sockets between
//! processes.
//!
//! # Crate Structure
//!
//! - [`schema`]: event key to JSON Schema registry and validation
//! - [`bus`]: local subscribe/dispatch bus with lifecycle hooks
//! - [`port`]: message port abstraction, in-memory hub, Unix socket transport
//! - [`relay`]: envelope relaying across ports (behind `peer` feature)

/// Re-export schema registry types.
pub mod schema {
    pub use relaybus_schema::*;
}

/// Re-export event bus types.
pub mod bus {
    pub use relaybus_core::*;
}

/// Re-export message port types.
pub mod port {
    pub use relaybus_port::*;
}

/// Re-export relay types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod relay {
    pub use relaybus_peer::*;
}
