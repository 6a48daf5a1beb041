use std::fs;
use std::sync::Arc;
use std::time::Duration;

use relaybus_schema::SchemaRegistry;
use serde_json::Value;

use crate::cmd::{load_registry, SendArgs};
use crate::exit::{schema_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let timeout = parse_duration(&args.timeout)?;
    let registry = load_registry(&args.schemas)?;

    // Validate before touching the socket so a bad payload fails fast even
    // when no relay is running.
    registry
        .validate(&args.event, &payload)
        .map_err(|err| schema_error("payload rejected", err))?;

    dispatch_over_uds(args, registry, payload, timeout)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.payload {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--payload is not valid JSON: {err}")));
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                crate::exit::DATA_INVALID,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Err(CliError::new(
        USAGE,
        "one of --payload or --file is required",
    ))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
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
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(unix)]
fn dispatch_over_uds(
    args: SendArgs,
    registry: Arc<SchemaRegistry>,
    payload: Value,
    timeout: Duration,
) -> CliResult<i32> {
    use relaybus_peer::{MessagePort, PortTarget, RelayBus};

    use crate::cmd::connect_with_timeout;
    use crate::exit::{relay_error, SUCCESS};

    let port: Arc<dyn MessagePort> = connect_with_timeout(&args.socket, &args.origin, timeout)?;
    let relay = RelayBus::new(registry, port.clone());
    relay.add_target(PortTarget::unrestricted(port));

    tracing::debug!(
        event = args.event,
        identifier = relay.identifier(),
        "dispatching over socket"
    );
    relay
        .dispatch(&args.event, &payload)
        .map_err(|err| relay_error("dispatch failed", err))?;

    Ok(SUCCESS)
}

#[cfg(not(unix))]
fn dispatch_over_uds(
    _args: SendArgs,
    _registry: Arc<SchemaRegistry>,
    _payload: Value,
    _timeout: Duration,
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

    fn args_with(payload: Option<&str>, file: Option<PathBuf>) -> SendArgs {
        SendArgs {
            socket: PathBuf::from("/tmp/unused.sock"),
            schemas: PathBuf::from("/tmp/unused"),
            event: "demo/message".to_string(),
            payload: payload.map(str::to_string),
            file,
            origin: "relay://child".to_string(),
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn resolve_payload_parses_inline_json() {
        let args = args_with(Some(r#"{"message": "hi"}"#), None);
        let payload = resolve_payload(&args).expect("inline JSON should parse");
        assert_eq!(payload, json!({"message": "hi"}));
    }

    #[test]
    fn resolve_payload_rejects_bad_inline_json() {
        let args = args_with(Some("{nope"), None);
        let err = resolve_payload(&args).expect_err("bad JSON should be rejected");
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn resolve_payload_reads_a_file() {
        let path = std::env::temp_dir().join(format!("relaybus-send-{}.json", std::process::id()));
        fs::write(&path, r#"{"message": "from disk"}"#).expect("temp file should write");

        let args = args_with(None, Some(path.clone()));
        let payload = resolve_payload(&args).expect("file payload should parse");
        assert_eq!(payload, json!({"message": "from disk"}));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn resolve_payload_requires_a_source() {
        let err = resolve_payload(&args_with(None, None)).expect_err("missing payload is an error");
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
