use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    schema_id: &'a str,
    event: &'a str,
    payload: &'a Value,
    timestamp: String,
}

pub fn print_event(event: &str, payload: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                schema_id: "https://schemas.3leaps.dev/relaybus/cli/v1/event-received.schema.json",
                event,
                payload,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "PAYLOAD"])
                .add_row(vec![event.to_string(), payload_text(payload)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("event={event} payload={}", payload_text(payload));
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

/// Bare payload to stdout, one message per line. String payloads print
/// without their JSON quoting.
pub fn print_raw(payload: &Value) {
    let text = match payload {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let mut out = std::io::stdout();
    let _ = out.write_all(text.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

pub fn payload_text(payload: &Value) -> String {
    payload.to_string()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
