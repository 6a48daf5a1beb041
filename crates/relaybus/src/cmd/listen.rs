use std::sync::Arc;
use std::time::Duration;

use relaybus_schema::SchemaRegistry;

use crate::cmd::{load_registry, ListenArgs};
use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let registry = load_registry(&args.schemas)?;
    let events = resolve_events(&args, &registry)?;
    listen_over_uds(args, registry, events, timeout, format)
}

fn resolve_events(args: &ListenArgs, registry: &SchemaRegistry) -> CliResult<Vec<String>> {
    match &args.events {
        Some(events) => {
            for event in events {
                if !registry.has_schema(event) {
                    return Err(CliError::new(USAGE, format!("unknown event key: {event}")));
                }
            }
            Ok(events.clone())
        }
        None => Ok(registry.events()),
    }
}

fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported timeout unit: {unit}"),
        )),
    }
}

#[cfg(unix)]
fn listen_over_uds(
    args: ListenArgs,
    registry: Arc<SchemaRegistry>,
    events: Vec<String>,
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use relaybus_peer::{handler, MessagePort, RelayBus, RelayOptions};
    use relaybus_port::PortError;

    use crate::cmd::connect_with_timeout;
    use crate::exit::{port_error, SUCCESS};
    use crate::output::print_event;

    const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

    let peer = connect_with_timeout(&args.socket, &args.origin, timeout)?;
    let port: Arc<dyn MessagePort> = peer.clone();
    let relay = RelayBus::with_options(registry, port, RelayOptions::new().with_default_hooks(true));

    let received = Arc::new(AtomicUsize::new(0));
    for event in &events {
        let event_name = event.clone();
        let received = received.clone();
        relay.subscribe(
            event,
            handler(move |payload| {
                print_event(&event_name, payload, format);
                received.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    tracing::info!(
        socket = %args.socket.display(),
        events = events.len(),
        identifier = relay.identifier(),
        "listening for events"
    );

    while running.load(Ordering::SeqCst) {
        match peer.poll() {
            Ok(_) => {}
            Err(PortError::Closed) => break,
            Err(err) => return Err(port_error("receive failed", err)),
        }

        if let Some(count) = args.count {
            if received.load(Ordering::SeqCst) >= count {
                break;
            }
        }

        std::thread::sleep(IDLE_POLL_INTERVAL);
    }

    Ok(SUCCESS)
}

#[cfg(unix)]
fn install_ctrlc_handler(running: Arc<std::sync::atomic::AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(not(unix))]
fn listen_over_uds(
    _args: ListenArgs,
    _registry: Arc<SchemaRegistry>,
    _events: Vec<String>,
    _timeout: Duration,
    _format: OutputFormat,
) -> CliResult<i32> {
    Err(CliError::new(
        crate::exit::TRANSPORT_ERROR,
        "unix domain sockets are not available on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    fn registry_with_message_schema() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register_value(
                "demo/message",
                &json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }),
            )
            .expect("schema should register");
        registry
    }

    fn args_with_events(events: Option<Vec<&str>>) -> ListenArgs {
        ListenArgs {
            socket: PathBuf::from("/tmp/unused.sock"),
            schemas: PathBuf::from("/tmp/unused"),
            events: events.map(|e| e.into_iter().map(str::to_string).collect()),
            count: None,
            origin: "relay://child".to_string(),
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn resolve_events_defaults_to_every_registered_event() {
        let registry = registry_with_message_schema();
        let events =
            resolve_events(&args_with_events(None), &registry).expect("default should resolve");
        assert_eq!(events, vec!["demo/message".to_string()]);
    }

    #[test]
    fn resolve_events_rejects_unknown_keys() {
        let registry = registry_with_message_schema();
        let err = resolve_events(&args_with_events(Some(vec!["demo/ghost"])), &registry)
            .expect_err("unknown event should be rejected");
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("demo/ghost"));
    }

    #[test]
    fn parse_timeout_seconds_and_millis() {
        assert_eq!(parse_timeout("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_timeout("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_timeout("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn parse_timeout_rejects_invalid_values() {
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
