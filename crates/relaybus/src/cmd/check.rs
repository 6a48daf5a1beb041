use relaybus_schema::{RegistryConfig, SchemaError, SchemaRegistry};
use serde::Serialize;

use crate::cmd::CheckArgs;
use crate::exit::{schema_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::OutputFormat;

const VALIDATION_SCHEMA_ID: &str =
    "https://schemas.3leaps.dev/relaybus/cli/v1/validation-result.schema.json";

#[derive(Serialize)]
struct SchemaListOutput {
    schema_id: &'static str,
    schema_count: usize,
    events: Vec<String>,
}

#[derive(Serialize)]
struct ViolationOutput {
    instance_path: String,
    message: String,
}

#[derive(Serialize)]
struct ValidationOutput {
    schema_id: &'static str,
    event: String,
    valid: bool,
    violations: Vec<ViolationOutput>,
}

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let config = RegistryConfig {
        strict_mode: args.strict,
        ..RegistryConfig::default()
    };
    let registry = SchemaRegistry::from_directory_with_config(&args.schemas, config)
        .map_err(|err| schema_error("schema load failed", err))?;
    if registry.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no schemas found in {}", args.schemas.display()),
        ));
    }

    match (&args.event, &args.payload) {
        (Some(event), Some(payload)) => validate_payload(&registry, event, payload, format),
        _ => {
            let out = SchemaListOutput {
                schema_id: "https://schemas.3leaps.dev/relaybus/cli/v1/schema-list.schema.json",
                schema_count: registry.len(),
                events: registry.events(),
            };
            print_schema_list(&out, format);
            Ok(SUCCESS)
        }
    }
}

fn validate_payload(
    registry: &SchemaRegistry,
    event: &str,
    payload: &str,
    format: OutputFormat,
) -> CliResult<i32> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|err| CliError::new(USAGE, format!("--payload is not valid JSON: {err}")))?;

    match registry.validate(event, &value) {
        Ok(()) => {
            let out = ValidationOutput {
                schema_id: VALIDATION_SCHEMA_ID,
                event: event.to_string(),
                valid: true,
                violations: Vec::new(),
            };
            print_validation(&out, format);
            Ok(SUCCESS)
        }
        Err(SchemaError::PayloadInvalid { violations, .. }) => {
            let out = ValidationOutput {
                schema_id: VALIDATION_SCHEMA_ID,
                event: event.to_string(),
                valid: false,
                violations: violations
                    .into_iter()
                    .map(|v| ViolationOutput {
                        instance_path: v.instance_path,
                        message: v.message,
                    })
                    .collect(),
            };
            print_validation(&out, format);
            Ok(DATA_INVALID)
        }
        Err(err) => Err(schema_error("validation failed", err)),
    }
}

fn print_schema_list(out: &SchemaListOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Schemas loaded: {}", out.schema_count);
            for event in &out.events {
                println!("  {event}");
            }
        }
        OutputFormat::Raw => {
            for event in &out.events {
                println!("{event}");
            }
        }
    }
}

fn print_validation(out: &ValidationOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            if out.valid {
                println!("{}: valid", out.event);
            } else {
                println!("{}: invalid", out.event);
                for violation in &out.violations {
                    let path = if violation.instance_path.is_empty() {
                        "/"
                    } else {
                        violation.instance_path.as_str()
                    };
                    println!("  {path}: {}", violation.message);
                }
            }
        }
        OutputFormat::Raw => {
            println!("{}", if out.valid { "valid" } else { "invalid" });
        }
    }
}
