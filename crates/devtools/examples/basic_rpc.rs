//! Basic example - connect to a browser's DevTools socket and drive it

use devtools::{Correlator, CorrelatorConfig};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9222/devtools/browser".to_string());
    println!("Connecting to: {}", endpoint);

    let config = CorrelatorConfig::default().with_default_timeout(Duration::from_secs(10));
    let client = Correlator::connect(&Handle::current(), &endpoint, config).await?;
    println!("Connected!");

    let version = client.call("Browser.getVersion", None).await?;
    println!("Browser version: {:?}", version.result());

    // Same call through the namespace/action sugar
    let targets = client.domain("target").call("get_targets", None).await?;
    println!("Targets: {:?}", targets.into_response().map(|m| m.into_value()));

    // Fire-and-forget: the reply lands in the skip buffer
    client
        .domain("target")
        .call("set_discover_targets_nowait", Some(json!({ "discover": true })))
        .await?;

    // Collect whatever target events show up in the next couple of seconds
    while let Ok(event) = client
        .wait_event("Target.targetCreated", Duration::from_secs(2))
        .await
    {
        println!("Target created: {:?}", event.params());
    }

    println!("Unmatched messages left: {}", client.pop_messages().len());

    // Clean shutdown
    client.close().await;
    println!("Disconnected");

    Ok(())
}
