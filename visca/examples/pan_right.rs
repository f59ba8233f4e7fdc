//! Pan camera 1 right for a moment, then stop

use std::time::Duration;

use visca::{Address, Client, Config, NetMode};

#[tokio::main]
async fn main() -> visca::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Serial device path or host:port
    let target = std::env::var("VISCA_LINK").unwrap_or_else(|_| Config::default().connection);
    let mode = match std::env::var("VISCA_RAW_TCP") {
        Ok(_) => NetMode::RawTcp,
        Err(_) => NetMode::Rfc2217,
    };

    println!("Connecting to {}...", target);
    let client = Client::spawn(Config::new(target).with_net_mode(mode).with_auto_connect(false))?;
    client.connect().await?;
    println!("✓ Connected");

    let camera = client.camera(Address::DEFAULT);
    camera.right().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    camera.stop().await?;
    println!("✓ Moved right");

    client.shutdown().await?;
    println!("✓ Disconnected");
    Ok(())
}
