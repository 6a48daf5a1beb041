use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::handler::Handler;

/// Observer invoked after a handler is subscribed.
pub type SubscribeHook = Arc<dyn Fn(&str, &Handler) + Send + Sync>;

/// Observer invoked after an unsubscribe against a known event key.
pub type UnsubscribeHook = Arc<dyn Fn(&str, &Handler) + Send + Sync>;

/// Observer invoked on dispatch, before handlers, with the payload as passed
/// by the caller.
pub type DispatchHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

const PREVIEW_BUDGET: usize = 160;

pub(crate) fn log_subscribe_hook() -> SubscribeHook {
    Arc::new(|event, handler| {
        debug!(event, handler = ?Arc::as_ptr(handler), "subscribe");
    })
}

pub(crate) fn log_unsubscribe_hook() -> UnsubscribeHook {
    Arc::new(|event, handler| {
        debug!(event, handler = ?Arc::as_ptr(handler), "unsubscribe");
    })
}

pub(crate) fn log_dispatch_hook() -> DispatchHook {
    Arc::new(|event, payload| {
        debug!(event, payload = %payload_preview(payload), "dispatch");
    })
}

pub(crate) fn payload_preview(payload: &Value) -> String {
    let text = payload.to_string();
    if text.len() <= PREVIEW_BUDGET {
        return text;
    }
    let mut preview: String = text.chars().take(PREVIEW_BUDGET).collect();
    preview.push_str("...");
    preview
}
