/// One schema violation within a rejected payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer into the payload at which the violation occurred.
    pub instance_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

/// Errors that can occur while registering schemas or validating payloads.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema file could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No schema registered for the given event key.
    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    /// The payload failed schema validation for its event key.
    #[error("invalid payload for event {event:?}: {}", summarize(.violations))]
    PayloadInvalid {
        event: String,
        violations: Vec<Violation>,
    },
}

// Display shows the first violation plus up to three more; the full list stays
// on the variant for callers that surface violations individually.
fn summarize(violations: &[Violation]) -> String {
    let mut out = String::new();
    for (index, violation) in violations.iter().take(4).enumerate() {
        if index > 0 {
            out.push_str("; ");
        }
        out.push_str(&violation.message);
    }
    if violations.len() > 4 {
        out.push_str(&format!(" (and {} more)", violations.len() - 4));
    }
    out
}

pub type Result<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(n: usize) -> Violation {
        Violation {
            instance_path: format!("/field{n}"),
            message: format!("violation {n}"),
        }
    }

    #[test]
    fn payload_invalid_display_lists_leading_violations() {
        let err = SchemaError::PayloadInvalid {
            event: "chat".to_string(),
            violations: vec![violation(1), violation(2)],
        };
        let text = err.to_string();
        assert!(text.contains("\"chat\""));
        assert!(text.contains("violation 1; violation 2"));
    }

    #[test]
    fn payload_invalid_display_truncates_long_lists() {
        let err = SchemaError::PayloadInvalid {
            event: "chat".to_string(),
            violations: (0..6).map(violation).collect(),
        };
        let text = err.to_string();
        assert!(text.contains("violation 3"));
        assert!(!text.contains("violation 4"));
        assert!(text.contains("(and 2 more)"));
    }

    #[test]
    fn unknown_event_display_names_the_key() {
        let err = SchemaError::UnknownEvent("missing".to_string());
        assert_eq!(err.to_string(), "unknown event \"missing\"");
    }
}
