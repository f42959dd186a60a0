//! Tandem demo - two clients editing one document over a loopback server.
//!
//! Both clients type concurrently, then the program waits for every edit to
//! be acknowledged and checks that both views match the server.

use std::sync::Arc;
use std::time::Duration;

use tandem_client::{logging, LoopbackServer, Session, SharedBuffer, SyncConfig};
use tandem_engine::Operation;

const DOC_ID: &str = "demo";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    logging::init_tracing("tandem_client=info");

    // Load configuration
    let config = SyncConfig::load()?;
    tracing::info!(flush_delay_ms = config.flush_delay.as_millis() as u64, "Starting Tandem demo");

    let server = LoopbackServer::new_shared();
    server.create_document(DOC_ID, "Hello World");

    let mut clients = Vec::new();
    for _ in 0..2 {
        let (transport, events) = server.connect();
        let (session, _notices) = Session::new(Arc::new(transport), config.clone());
        let session = Arc::new(session);
        session.spawn_inbound(events);

        let buffer = SharedBuffer::new();
        let handle = session.open_document(DOC_ID, buffer.clone()).await?;
        clients.push((session, handle, buffer));
    }

    let (_, alice, _) = &clients[0];
    let (_, bob, _) = &clients[1];
    let typing_alice = async {
        for (i, ch) in " Beautiful".chars().enumerate() {
            alice.edit(Operation::insert(5 + i, ch.to_string())).await?;
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        Ok::<_, tandem_client::SyncError>(())
    };
    let typing_bob = async {
        bob.edit(Operation::insert(11, "!")).await?;
        tokio::time::sleep(Duration::from_millis(40)).await;
        bob.edit(Operation::delete(0, "H")).await?;
        bob.edit(Operation::insert(0, "h")).await?;
        Ok::<_, tandem_client::SyncError>(())
    };
    let (a, b) = tokio::join!(typing_alice, typing_bob);
    a?;
    b?;

    // Wait until nothing is pending or in flight anywhere
    let server_version = loop {
        tokio::time::sleep(config.flush_delay * 2).await;
        let mut settled = true;
        for (_, handle, _) in &clients {
            let view = handle.view().await?;
            settled &= view.inflight.is_none()
                && view.pending.is_none()
                && view.version == server.version(DOC_ID);
        }
        if settled {
            break server.version(DOC_ID);
        }
    };

    let expected = server.text(DOC_ID).unwrap_or_default();
    for (i, (_, _, buffer)) in clients.iter().enumerate() {
        let text = buffer.text();
        println!("client {i}: {text:?}");
        if text != expected {
            return Err(format!("client {i} diverged from server text {expected:?}").into());
        }
    }
    println!("server:   {expected:?} at version {server_version:?}");

    for (session, _, _) in &clients {
        session.close_all().await;
    }
    Ok(())
}
