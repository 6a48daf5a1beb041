use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use relaybus_core::{DispatchHook, EventBus, Handler, SubscribeHook, UnsubscribeHook};
use relaybus_port::{ListenerError, MessageListener, MessagePort};
use relaybus_schema::SchemaRegistry;
use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::{Envelope, Role};
use crate::error::{RelayError, Result};
use crate::identity::{InstanceIdSource, SecureIdSource};
use crate::target::{same_port, PortTarget};

/// Construction options for a [`RelayBus`].
#[derive(Clone)]
pub struct RelayOptions {
    role: Role,
    default_hooks: bool,
    id_source: Arc<dyn InstanceIdSource>,
}

impl RelayOptions {
    pub fn new() -> Self {
        Self {
            role: Role::default(),
            default_hooks: false,
            id_source: Arc::new(SecureIdSource),
        }
    }

    /// Act as parent (re-broadcasting hub) or child (leaf). Default: child.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Preinstall the tracing-based lifecycle hooks on the local bus.
    pub fn with_default_hooks(mut self, enabled: bool) -> Self {
        self.default_hooks = enabled;
        self
    }

    /// Override how the instance identifier is generated.
    pub fn with_id_source(mut self, source: Arc<dyn InstanceIdSource>) -> Self {
        self.id_source = source;
        self
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    identifier: String,
    role: Role,
    bus: EventBus,
    current: Mutex<Arc<dyn MessagePort>>,
    targets: Mutex<Vec<PortTarget>>,
}

/// An event bus bridged across message ports.
///
/// A relay owns a local [`EventBus`] and a listener on one port (the
/// *current* port). Outbound [`RelayBus::dispatch`] validates the payload,
/// wraps it in an [`Envelope`] stamped with this instance's identifier, and
/// posts it to every configured target; it never delivers locally. Inbound
/// envelopes are validated, checked against our own identifier (an envelope
/// we originated has looped back and is dropped), and delivered to local
/// subscribers; a parent additionally re-broadcasts the envelope to its
/// targets with the original source intact, so the originator can recognize
/// the echo.
///
/// Instances must be [`RelayBus::release`]d (or dropped) to detach the port
/// listener; the listener itself holds only a weak reference back, so a
/// leaked registration goes inert rather than keeping the relay alive.
pub struct RelayBus {
    shared: Arc<Shared>,
    listener: MessageListener,
}

impl RelayBus {
    /// Create a child relay on `port` with a generated UUID identifier.
    pub fn new(registry: Arc<SchemaRegistry>, port: Arc<dyn MessagePort>) -> Self {
        Self::with_options(registry, port, RelayOptions::new())
    }

    pub fn with_options(
        registry: Arc<SchemaRegistry>,
        port: Arc<dyn MessagePort>,
        options: RelayOptions,
    ) -> Self {
        let bus = if options.default_hooks {
            EventBus::with_default_hooks(registry)
        } else {
            EventBus::new(registry)
        };
        let shared = Arc::new(Shared {
            identifier: options.id_source.generate(),
            role: options.role,
            bus,
            current: Mutex::new(port.clone()),
            targets: Mutex::new(Vec::new()),
        });
        let listener = make_listener(&shared);
        port.add_listener(listener.clone());
        Self { shared, listener }
    }

    /// This instance's identifier, stamped into every outbound envelope.
    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// The registry every dispatch and receipt is validated against.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.shared.bus.registry()
    }

    /// Subscribe a local handler for an event key.
    ///
    /// Local handlers see inbound traffic only; this instance's own
    /// dispatches do not loop back to them.
    pub fn subscribe(&self, event: &str, handler: Handler) {
        self.shared.bus.subscribe(event, handler);
    }

    pub fn unsubscribe(&self, event: &str, handler: &Handler) {
        self.shared.bus.unsubscribe(event, handler);
    }

    pub fn on_subscribe(&self, hook: SubscribeHook) {
        self.shared.bus.on_subscribe(hook);
    }

    pub fn on_unsubscribe(&self, hook: UnsubscribeHook) {
        self.shared.bus.on_unsubscribe(hook);
    }

    /// Register a dispatch hook on the local bus.
    ///
    /// Dispatch hooks observe local delivery, which for a relay means
    /// inbound envelopes; outbound fan-out does not pass through them.
    pub fn on_dispatch(&self, hook: DispatchHook) {
        self.shared.bus.on_dispatch(hook);
    }

    /// Validate `payload` and post it to every target, enveloped under this
    /// instance's identifier.
    ///
    /// Fails on an unknown event key or a schema violation, in which case
    /// nothing is posted. Local subscribers are never invoked on the
    /// outbound path.
    pub fn dispatch(&self, event: &str, payload: &Value) -> Result<()> {
        self.shared.bus.registry().validate(event, payload)?;
        let envelope = Envelope::new(self.shared.identifier.clone(), event, payload.clone());
        match serde_json::to_value(&envelope) {
            Ok(message) => self.shared.fan_out(&message),
            Err(err) => warn!(event, error = %err, "failed to encode outbound envelope"),
        }
        Ok(())
    }

    /// The port this relay currently listens on.
    pub fn current_port(&self) -> Arc<dyn MessagePort> {
        lock(&self.shared.current).clone()
    }

    /// The inbound listener this relay registers on its current port.
    ///
    /// Useful for attaching the same relay to more than one port (a server
    /// accepting many connections); detaching those extra registrations is
    /// the caller's business.
    pub fn listener(&self) -> MessageListener {
        self.listener.clone()
    }

    /// Move the inbound listener to `port`.
    ///
    /// Exactly one registration moves: the old port loses this relay's
    /// listener, the new one gains it.
    pub fn set_current_port(&self, port: Arc<dyn MessagePort>) {
        let mut current = lock(&self.shared.current);
        current.remove_listener(&self.listener);
        port.add_listener(self.listener.clone());
        *current = port;
    }

    /// Snapshot of the target roster.
    ///
    /// The returned vector is detached; mutating it does not touch the
    /// relay. Use the roster methods to change targets.
    pub fn targets(&self) -> Vec<PortTarget> {
        lock(&self.shared.targets).clone()
    }

    /// Replace the whole target roster.
    pub fn set_targets(&self, targets: Vec<PortTarget>) {
        *lock(&self.shared.targets) = targets;
    }

    /// Append one target. The same port may appear more than once, each
    /// entry with its own origin restriction.
    pub fn add_target(&self, target: PortTarget) {
        lock(&self.shared.targets).push(target);
    }

    /// Remove the first roster entry whose port is `port` (by identity).
    /// Unknown ports are a no-op.
    pub fn remove_target(&self, port: &Arc<dyn MessagePort>) {
        let mut targets = lock(&self.shared.targets);
        if let Some(index) = targets.iter().position(|t| same_port(t.port(), port)) {
            targets.remove(index);
        }
    }

    /// Detach the inbound listener from the current port.
    ///
    /// Idempotent; the relay can still dispatch outbound afterwards, it
    /// just no longer receives.
    pub fn release(&self) {
        lock(&self.shared.current).remove_listener(&self.listener);
    }
}

impl Drop for RelayBus {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RelayBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayBus")
            .field("identifier", &self.shared.identifier)
            .field("role", &self.shared.role)
            .field("targets", &lock(&self.shared.targets).len())
            .finish()
    }
}

impl Shared {
    /// Handle one inbound message from the current port.
    ///
    /// Order matters: parse, validate, then the echo check. A malformed or
    /// invalid message is rejected even when it carries our own identifier,
    /// so a misbehaving peer cannot hide behind an echo.
    fn handle_message(&self, message: &Value) -> Result<()> {
        let envelope: Envelope =
            serde_json::from_value(message.clone()).map_err(RelayError::MalformedEnvelope)?;
        self.bus.registry().validate(&envelope.event, &envelope.payload)?;

        if envelope.source == self.identifier {
            debug!(event = %envelope.event, "dropping echoed envelope");
            return Ok(());
        }

        // Already validated above, so local delivery skips the registry.
        self.bus.dispatch_validated(&envelope.event, &envelope.payload);

        // A parent forwards the message as received: the original source
        // rides along so the originator can recognize its own echo.
        if self.role == Role::Parent {
            self.fan_out(message);
        }
        Ok(())
    }

    fn fan_out(&self, message: &Value) {
        let targets: Vec<PortTarget> = lock(&self.targets).clone();
        for target in targets {
            target.post(message);
        }
    }
}

fn make_listener(shared: &Arc<Shared>) -> MessageListener {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    Arc::new(move |message: &Value| {
        let Some(shared) = weak.upgrade() else {
            return Ok(());
        };
        shared
            .handle_message(message)
            .map_err(|err| Box::new(err) as ListenerError)
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
