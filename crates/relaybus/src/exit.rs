use std::fmt;
use std::io;

use relaybus_peer::RelayError;
use relaybus_port::PortError;
use relaybus_schema::SchemaError;

// Exit code constants: sysexits for usage, coreutils convention for timeout.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::PermissionDenied => TRANSPORT_ERROR,
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn port_error(context: &str, err: PortError) -> CliError {
    match err {
        PortError::Bind { source, .. }
        | PortError::Connect { source, .. }
        | PortError::Accept(source)
        | PortError::Io(source) => io_error(context, source),
        PortError::InvalidJson(_) | PortError::BodyTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PortError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn schema_error(context: &str, err: SchemaError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn relay_error(context: &str, err: RelayError) -> CliError {
    match err {
        RelayError::Schema(source) => schema_error(context, source),
        RelayError::MalformedEnvelope(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}
