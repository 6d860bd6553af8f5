//! Network event monitoring.
//!
//! Demonstrates:
//! - `wait_for` for a single event
//! - `listen` for a continuous stream of several event types
//!
//! Usage:
//!   cargo run --example network_events -- ws://localhost:9222/devtools/browser/<id> https://example.com

mod common;

// ============================================================================
// Imports
// ============================================================================

use futures_util::StreamExt;

use cdp_mux::{Connection, Error, NetworkCommand, PageCommand, ParsedEvent, Result, method};
use common::Args;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    let [endpoint, url] = args.positional.as_slice() else {
        eprintln!("Usage: network_events <browser ws url> <target url>");
        std::process::exit(1);
    };

    if let Err(e) = run(endpoint, url).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(endpoint: &str, url: &str) -> Result<()> {
    let connection = Connection::connect(endpoint).await?;
    let target_id = common::free_page(&connection).await?;

    connection
        .with_session(target_id, |session| async move {
            session.execute(NetworkCommand::Enable {}).await?;
            session.execute(PageCommand::Enable {}).await?;

            // Pattern 1: wait for a single event
            println!("[1] Navigating to {url}...");
            let loaded = session.wait_for(method::PAGE_LOAD_EVENT_FIRED)?;
            session
                .execute(PageCommand::Navigate {
                    url: url.to_string(),
                })
                .await?;
            loaded.await?;
            println!("    ✓ Page loaded");

            // Pattern 2: continuous listener
            println!("[2] Monitoring network events (Ctrl+C to stop)...");
            let mut events = session.listen(&[
                method::NETWORK_REQUEST_WILL_BE_SENT,
                method::NETWORK_RESPONSE_RECEIVED,
                method::NETWORK_LOADING_FINISHED,
                method::NETWORK_LOADING_FAILED,
            ])?;

            loop {
                tokio::select! {
                    event = events.next() => match event {
                        Some(event) => print_event(&event.payload),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            Ok::<_, Error>(())
        })
        .await?;

    connection.close().await;
    Ok(())
}

fn print_event(payload: &ParsedEvent) {
    match payload {
        ParsedEvent::NetworkRequestWillBeSent { method, url, .. } => {
            println!("    → {method} {url}");
        }
        ParsedEvent::NetworkResponseReceived { status, url, .. } => {
            println!("    ← {status} {url}");
        }
        ParsedEvent::NetworkLoadingFinished { request_id } => {
            println!("    ✓ finished {request_id}");
        }
        ParsedEvent::NetworkLoadingFailed {
            request_id,
            error_text,
        } => {
            println!("    ✗ failed {request_id}: {error_text}");
        }
        other => println!("    {other:?}"),
    }
}
