//! In-process fan-out: one parent relay and three children on a memory hub.
//!
//! Run with:
//!   cargo run --example relay-fanout --features peer

use std::sync::Arc;

use relaybus::port::MemoryHub;
use relaybus::relay::{
    handler, FixedIdSource, PortTarget, RelayBus, RelayOptions, Role,
};
use relaybus::schema::SchemaRegistry;
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = SchemaRegistry::new();
    registry.register_value(
        "chat/message",
        &json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }),
    )?;
    let registry = Arc::new(registry);

    let hub = MemoryHub::new();

    // The parent listens on its own inbox; every child posts there.
    let parent_inbox = hub.create_port("relay://parent");
    let parent = RelayBus::with_options(
        registry.clone(),
        parent_inbox.clone(),
        RelayOptions::new()
            .with_role(Role::Parent)
            .with_id_source(Arc::new(FixedIdSource::new("parent"))),
    );

    let mut children = Vec::new();
    for index in 0..3 {
        let inbox = hub.create_port(format!("relay://child-{index}"));
        let child = RelayBus::with_options(
            registry.clone(),
            inbox.clone(),
            RelayOptions::new()
                .with_id_source(Arc::new(FixedIdSource::new(format!("child-{index}")))),
        );
        child.add_target(PortTarget::unrestricted(parent_inbox.clone()));
        parent.add_target(PortTarget::unrestricted(inbox));
        children.push(child);
    }

    parent.subscribe(
        "chat/message",
        handler(|payload| {
            eprintln!("parent received: {payload}");
        }),
    );
    for child in &children {
        let name = child.identifier().to_string();
        child.subscribe(
            "chat/message",
            handler(move |payload| {
                eprintln!("{name} received: {payload}");
            }),
        );
    }

    // child-0 speaks; the parent re-broadcasts to everyone, and child-0
    // recognizes its own echo and stays quiet.
    children[0].dispatch("chat/message", &json!({"text": "hello, everyone"}))?;

    let delivered = hub.pump();
    eprintln!("hub delivered {delivered} messages");

    Ok(())
}
