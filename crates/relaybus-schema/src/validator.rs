use jsonschema::Validator;
use serde_json::Value;

use crate::error::{Result, SchemaError, Violation};

pub(crate) fn validate_value(event: &str, payload: &Value, validator: &Validator) -> Result<()> {
    let violations: Vec<Violation> = validator
        .iter_errors(payload)
        .map(|err| Violation {
            instance_path: err.instance_path.to_string(),
            message: err.to_string(),
        })
        .collect();

    if violations.is_empty() {
        return Ok(());
    }

    Err(SchemaError::PayloadInvalid {
        event: event.to_string(),
        violations,
    })
}
