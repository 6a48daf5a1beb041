use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relaybus_schema::{Result, SchemaRegistry};
use serde_json::Value;

use crate::handler::{same_handler, Handler};
use crate::hooks::{
    log_dispatch_hook, log_subscribe_hook, log_unsubscribe_hook, DispatchHook, SubscribeHook,
    UnsubscribeHook,
};

/// In-process publish/subscribe bus with schema-validated dispatch.
///
/// Handlers are kept per event key in subscription order and invoked in that
/// order. Lifecycle hooks observe subscribe, unsubscribe, and dispatch for
/// every key uniformly; hooks accumulate and never replace one another.
///
/// Dispatching a key the registry does not know is always
/// `SchemaError::UnknownEvent`; a payload rejected by the key's schema is
/// `SchemaError::PayloadInvalid`, and neither hooks nor handlers run for a
/// rejected dispatch.
pub struct EventBus {
    registry: Arc<SchemaRegistry>,
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
    subscribe_hooks: Mutex<Vec<SubscribeHook>>,
    unsubscribe_hooks: Mutex<Vec<UnsubscribeHook>>,
    dispatch_hooks: Mutex<Vec<DispatchHook>>,
}

impl EventBus {
    /// Create a bus over a schema registry, with no hooks installed.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            handlers: Mutex::new(HashMap::new()),
            subscribe_hooks: Mutex::new(Vec::new()),
            unsubscribe_hooks: Mutex::new(Vec::new()),
            dispatch_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Create a bus with tracing-based lifecycle hooks preinstalled.
    ///
    /// The hooks log subscribe and unsubscribe at debug level with the
    /// handler address, and dispatch with a bounded payload preview. They are
    /// ordinary hooks; further hooks registered later run after them.
    pub fn with_default_hooks(registry: Arc<SchemaRegistry>) -> Self {
        let bus = Self::new(registry);
        bus.on_subscribe(log_subscribe_hook());
        bus.on_unsubscribe(log_unsubscribe_hook());
        bus.on_dispatch(log_dispatch_hook());
        bus
    }

    /// The registry this bus validates against.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Append a handler to the event key's list, then notify subscribe hooks.
    ///
    /// Duplicate registration is allowed and yields duplicate invocation on
    /// dispatch.
    pub fn subscribe(&self, event: &str, handler: Handler) {
        lock(&self.handlers)
            .entry(event.to_string())
            .or_default()
            .push(handler.clone());

        let hooks: Vec<SubscribeHook> = lock(&self.subscribe_hooks).clone();
        for hook in hooks {
            hook(event, &handler);
        }
    }

    /// Remove every occurrence of the handler (by identity) from the key's
    /// list.
    ///
    /// A key that never had a subscription is a complete no-op, unsubscribe
    /// hooks included. A key with a list notifies hooks even when the handler
    /// was not in it; the list itself survives, possibly empty.
    pub fn unsubscribe(&self, event: &str, handler: &Handler) {
        {
            let mut handlers = lock(&self.handlers);
            let Some(list) = handlers.get_mut(event) else {
                return;
            };
            list.retain(|registered| !same_handler(registered, handler));
        }

        let hooks: Vec<UnsubscribeHook> = lock(&self.unsubscribe_hooks).clone();
        for hook in hooks {
            hook(event, handler);
        }
    }

    /// Validate and deliver a payload to the key's subscribers.
    ///
    /// Order: registry check and validation first (a failure fires nothing),
    /// then dispatch hooks with the payload as passed, then handlers in
    /// subscription order with the validated payload. No handlers registered
    /// is still a successful dispatch.
    pub fn dispatch(&self, event: &str, payload: &Value) -> Result<()> {
        self.registry.validate(event, payload)?;
        self.deliver(event, payload);
        Ok(())
    }

    /// Deliver an already-validated payload, skipping registry checks.
    ///
    /// For callers that validated out-of-band (a relay receiving an envelope
    /// it has just checked) and must not pay for validation twice. Hooks and
    /// handlers run exactly as in [`EventBus::dispatch`].
    pub fn dispatch_validated(&self, event: &str, payload: &Value) {
        self.deliver(event, payload);
    }

    /// Register a subscribe hook.
    pub fn on_subscribe(&self, hook: SubscribeHook) {
        lock(&self.subscribe_hooks).push(hook);
    }

    /// Register an unsubscribe hook.
    pub fn on_unsubscribe(&self, hook: UnsubscribeHook) {
        lock(&self.unsubscribe_hooks).push(hook);
    }

    /// Register a dispatch hook.
    pub fn on_dispatch(&self, hook: DispatchHook) {
        lock(&self.dispatch_hooks).push(hook);
    }

    fn deliver(&self, event: &str, payload: &Value) {
        let hooks: Vec<DispatchHook> = lock(&self.dispatch_hooks).clone();
        for hook in hooks {
            hook(event, payload);
        }

        // Snapshot before invoking so handlers may reenter the bus; a
        // subscription made during delivery takes effect on the next dispatch.
        let handlers: Vec<Handler> = lock(&self.handlers)
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(payload);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
