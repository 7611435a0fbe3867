// ABOUTME: End-to-end player example
// ABOUTME: Connects to a Sendspin server and plays the stream in sync

use sendspin::{ClientConfig, GoodbyeReason, SendspinClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8927".to_string());

    let mut config = ClientConfig::new(base_url);
    config.client_name = "Sendspin Demo Player".to_string();

    let client = SendspinClient::connect(config).await?;
    let handle = client.handle();

    // Disconnect cleanly on ctrl-c.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.disconnect(GoodbyeReason::UserRequest);
        }
    });

    println!("Connected. Playing until the stream ends or ctrl-c.");
    client.run().await?;
    println!("Session closed.");
    Ok(())
}
