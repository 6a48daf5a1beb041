use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of one relayed event.
///
/// `source` carries the identifier of the instance that originally dispatched
/// the event; it survives re-broadcast unchanged, which is what lets every
/// instance recognize and drop its own echoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "_source")]
    pub source: String,
    pub event: String,
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope for an event dispatched by `source`.
    pub fn new(source: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            source: source.into(),
            event: event.into(),
            payload,
        }
    }
}

/// How an instance participates in the relay graph.
///
/// A parent re-broadcasts everything it receives to its targets; a child
/// never re-broadcasts inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    Parent,
    #[default]
    Child,
}
