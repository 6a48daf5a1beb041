use std::sync::Arc;

use relaybus_schema::SchemaRegistry;

use crate::cmd::{load_registry, ServeArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let registry = load_registry(&args.schemas)?;
    serve_over_uds(args, registry)
}

#[cfg(unix)]
fn serve_over_uds(args: ServeArgs, registry: Arc<SchemaRegistry>) -> CliResult<i32> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use relaybus_peer::{MessagePort, PortTarget, RelayBus, RelayOptions, Role};
    use relaybus_port::{MemoryHub, PortError, UdsListener, UdsPort};

    use crate::exit::{port_error, SUCCESS};

    const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

    let listener = UdsListener::bind(&args.socket, &args.origin)
        .map_err(|err| port_error("bind failed", err))?;

    // The relay expects a current port to listen on, but a server has no
    // single upstream. Anchor it on a quiet in-memory port and attach the
    // inbound listener to each accepted connection instead.
    let hub = MemoryHub::new();
    let anchor = hub.create_port(&args.origin);
    let relay = RelayBus::with_options(
        registry,
        anchor,
        RelayOptions::new()
            .with_role(Role::Parent)
            .with_default_hooks(true),
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    tracing::info!(
        socket = %args.socket.display(),
        origin = %args.origin,
        identifier = relay.identifier(),
        "relay serving"
    );

    let mut peers: Vec<Arc<UdsPort>> = Vec::new();
    while running.load(Ordering::SeqCst) {
        match listener.try_accept() {
            Ok(Some(peer)) => {
                tracing::info!(peer_origin = peer.peer_origin(), "peer connected");
                let port: Arc<dyn MessagePort> = peer.clone();
                port.add_listener(relay.listener());
                relay.add_target(PortTarget::unrestricted(port));
                peers.push(peer);
            }
            Ok(None) => {}
            Err(err) => return Err(port_error("accept failed", err)),
        }

        let mut index = 0;
        while index < peers.len() {
            match peers[index].poll() {
                Ok(_) => index += 1,
                Err(PortError::Closed) => {
                    let peer = peers.remove(index);
                    tracing::info!(peer_origin = peer.peer_origin(), "peer disconnected");
                    relay.remove_target(&(peer as Arc<dyn MessagePort>));
                }
                Err(err) => {
                    let peer = peers.remove(index);
                    tracing::warn!(
                        peer_origin = peer.peer_origin(),
                        error = %err,
                        "dropping peer after poll failure"
                    );
                    relay.remove_target(&(peer as Arc<dyn MessagePort>));
                }
            }
        }

        std::thread::sleep(IDLE_POLL_INTERVAL);
    }

    Ok(SUCCESS)
}

#[cfg(unix)]
fn install_ctrlc_handler(running: Arc<std::sync::atomic::AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .map_err(|err| {
        crate::exit::CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(not(unix))]
fn serve_over_uds(_args: ServeArgs, _registry: Arc<SchemaRegistry>) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::TRANSPORT_ERROR,
        "unix domain sockets are not available on this platform",
    ))
}
