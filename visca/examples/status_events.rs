//! Print status events while polling camera status
//!
//! Runs for a minute. Unplug the camera meanwhile to watch the reconnect
//! backoff.

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use visca::{Address, Client, Config, StatusEvent};

#[tokio::main]
async fn main() -> visca::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("visca=info")))
        .init();

    let target = std::env::var("VISCA_LINK").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let client = Client::spawn(Config::new(target))?;
    let mut events = client.subscribe();

    let camera = client.camera(Address::DEFAULT);
    let poller = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            match camera.status().await {
                Ok(status) => println!("status: {}", status),
                Err(e) => println!("status unavailable: {}", e),
            }
        }
    });

    let deadline = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(StatusEvent::ConnectionChanged { previous, current }) => {
                    println!("connection: {} -> {}", previous, current)
                }
                Ok(StatusEvent::ConnectionError(e)) => println!("connection error: {}", e),
                Ok(StatusEvent::CameraChanged { address, state }) => {
                    println!("camera {}: {}", address, state)
                }
                Ok(StatusEvent::Unsolicited(frame)) => println!("unsolicited: {}", frame),
                Err(e) => println!("missed events: {}", e),
            },
            _ = &mut deadline => break,
        }
    }

    poller.abort();
    client.shutdown().await
}
