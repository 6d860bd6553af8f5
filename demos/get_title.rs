//! Page title extraction.
//!
//! Demonstrates:
//! - HTTP endpoint resolution through `/json/version`
//! - Scoped session (`open_session` / `close`)
//! - Registering a wait before the navigation that triggers it
//! - DOM queries through a session
//!
//! Start the browser with `--remote-debugging-port=9222` first.
//!
//! Usage:
//!   cargo run --example get_title -- https://example.com
//!   CHROME_DEBUG_PORT=9000 cargo run --example get_title -- https://example.com --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use cdp_mux::{Connection, DomCommand, PageCommand, Result, method};
use common::Args;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    let Some(url) = args.positional.first().cloned() else {
        eprintln!("Usage: get_title <target url>");
        eprintln!("Environment: {} (default 9222)", common::PORT_ENV);
        std::process::exit(1);
    };

    if let Err(e) = run(&url).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(url: &str) -> Result<()> {
    let endpoint = common::http_endpoint();
    println!("[1] Connecting to {endpoint}...");
    let connection = Connection::connect(endpoint).await?;

    let target_id = common::free_page(&connection).await?;
    println!("[2] Attaching to target {target_id}...");
    let session = connection.open_session(target_id).await?;

    println!("[3] Navigating to {url}...");
    session.execute(PageCommand::Enable {}).await?;
    let loaded = session.wait_for(method::PAGE_LOAD_EVENT_FIRED)?;
    session
        .execute(PageCommand::Navigate {
            url: url.to_string(),
        })
        .await?;
    loaded.await?;

    println!("[4] Extracting title...");
    let document = session.execute(DomCommand::GetDocument {}).await?;
    let root = node_id(&document["root"]);
    let title = session
        .execute(DomCommand::QuerySelector {
            node_id: root,
            selector: "title".to_string(),
        })
        .await?;
    let html = session
        .execute(DomCommand::GetOuterHtml {
            node_id: node_id(&title),
        })
        .await?;
    println!("{}", html["outerHTML"].as_str().unwrap_or_default());

    session.close().await?;
    connection.close().await;
    Ok(())
}

fn node_id(value: &Value) -> i64 {
    value["nodeId"].as_i64().unwrap_or_default()
}
