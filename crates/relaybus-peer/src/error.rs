use relaybus_schema::SchemaError;
use thiserror::Error;

/// Errors surfaced by relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// An inbound message was not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(serde_json::Error),

    /// Schema registry rejected the event or payload.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_errors_convert_transparently() {
        let schema_err = SchemaError::UnknownEvent("ghost".to_string());
        let err: RelayError = schema_err.into();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn malformed_envelope_names_the_parse_failure() {
        let parse_err =
            serde_json::from_value::<crate::Envelope>(serde_json::json!({"event": "x"}))
                .expect_err("missing fields should fail");
        let err = RelayError::MalformedEnvelope(parse_err);
        assert!(err.to_string().starts_with("malformed envelope:"));
    }
}
