use std::time::Duration;

use renos_ws::{
    ClassifiedMessage, ConnectionState, RenosClient, RenosClientConfig, SubscriptionRequest,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "events_monitor\n\
  Connects to a device events socket, subscribes to every event type and logs what arrives.\n\
\n\
ENVIRONMENT:\n\
  RENOS_URL    device base address, no trailing slash (default http://localhost:8081)\n\
  RENOS_TOKEN  authentication token (optional)\n\
  RUST_LOG     log filter (default info)\n\
\n\
USAGE:\n\
  cargo run --example events_monitor\n\
"
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().skip(1).any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = std::env::var("RENOS_URL").unwrap_or_else(|_| "http://localhost:8081".to_string());
    let (sink, mut messages) = mpsc::unbounded_channel();
    let mut config = RenosClientConfig::new(url).with_message_sink(sink);
    if let Ok(token) = std::env::var("RENOS_TOKEN") {
        config = config.with_token(token);
    }

    let client = RenosClient::new(config)?;
    let mut states = client.state_changes();
    if client.start().await? {
        client.send_subscription(SubscriptionRequest::all()).await?;
    }
    states.borrow_and_update();

    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));
    heartbeat.tick().await;
    let mut events = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = states.changed() => {
                // Each new session starts without subscriptions.
                if *states.borrow_and_update() == ConnectionState::Connected {
                    let _ = client.send_subscription(SubscriptionRequest::all()).await;
                }
            }
            _ = heartbeat.tick() => {
                // Sends while the socket is down only warn.
                let _ = client.heartbeat().await;
            }
            Some(message) = messages.recv() => {
                if let ClassifiedMessage::Event(_) = message {
                    events += 1;
                }
            }
        }
    }

    println!("received {events} events");
    client.finish().await?;
    Ok(())
}
