use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Subcommand};
use relaybus_schema::SchemaRegistry;

use crate::exit::{schema_error, CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod check;
pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a parent relay that fans events out to every connected peer.
    Serve(ServeArgs),
    /// Dispatch a single event to a running relay.
    Send(SendArgs),
    /// Subscribe to events from a running relay and print them.
    Listen(ListenArgs),
    /// Load a schema directory, list its events or validate a payload.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,
    /// Schema directory (<event>.schema.json files).
    #[arg(long, value_name = "DIR")]
    pub schemas: PathBuf,
    /// Origin announced to connecting peers.
    #[arg(long, default_value = "relay://parent")]
    pub origin: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,
    /// Schema directory (<event>.schema.json files).
    #[arg(long, value_name = "DIR")]
    pub schemas: PathBuf,
    /// Event key to dispatch.
    #[arg(long, value_name = "KEY")]
    pub event: String,
    /// Inline JSON payload.
    #[arg(long, conflicts_with = "file")]
    pub payload: Option<String>,
    /// Read the JSON payload from a file.
    #[arg(long, value_name = "FILE", conflicts_with = "payload")]
    pub file: Option<PathBuf>,
    /// Origin announced to the relay.
    #[arg(long, default_value = "relay://child")]
    pub origin: String,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to connect to.
    #[arg(long, value_name = "PATH")]
    pub socket: PathBuf,
    /// Schema directory (<event>.schema.json files).
    #[arg(long, value_name = "DIR")]
    pub schemas: PathBuf,
    /// Subscribe to these event keys (comma-separated). Default: every
    /// registered event.
    #[arg(long, value_delimiter = ',')]
    pub events: Option<Vec<String>>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Origin announced to the relay.
    #[arg(long, default_value = "relay://child")]
    pub origin: String,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schema directory to load.
    #[arg(long, value_name = "DIR")]
    pub schemas: PathBuf,
    /// Validate this event key (with --payload).
    #[arg(long, value_name = "KEY", requires = "payload")]
    pub event: Option<String>,
    /// JSON payload to validate (with --event).
    #[arg(long, requires = "event")]
    pub payload: Option<String>,
    /// Reject undeclared object properties when loading schemas.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn load_registry(dir: &Path) -> CliResult<Arc<SchemaRegistry>> {
    let registry = SchemaRegistry::from_directory(dir)
        .map_err(|err| schema_error("schema load failed", err))?;
    if registry.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no schemas found in {}", dir.display()),
        ));
    }
    Ok(Arc::new(registry))
}

#[cfg(unix)]
pub(crate) fn connect_with_timeout(
    socket: &Path,
    origin: &str,
    timeout: std::time::Duration,
) -> CliResult<Arc<relaybus_port::UdsPort>> {
    use std::time::{Duration, Instant};

    use relaybus_port::UdsPort;

    use crate::exit::{port_error, TIMEOUT};

    const RETRY_INTERVAL: Duration = Duration::from_millis(50);

    let deadline = Instant::now() + timeout;
    loop {
        match UdsPort::connect(socket, origin) {
            Ok(port) => return Ok(port),
            Err(err) if is_retryable_connect(&err) => {
                if Instant::now() >= deadline {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!(
                            "no relay listening on {} after {:?}",
                            socket.display(),
                            timeout
                        ),
                    ));
                }
                std::thread::sleep(RETRY_INTERVAL);
            }
            Err(err) => return Err(port_error("connect failed", err)),
        }
    }
}

// The socket may not exist yet (server still starting) or may refuse while
// the backlog drains; both clear up on their own, so keep trying until the
// deadline.
#[cfg(unix)]
fn is_retryable_connect(err: &relaybus_port::PortError) -> bool {
    use std::io::ErrorKind;

    match err {
        relaybus_port::PortError::Connect { source, .. } => matches!(
            source.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused
        ),
        _ => false,
    }
}
