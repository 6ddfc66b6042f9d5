//! Multi-Room TCP Chat Relay - Entry Point
//!
//! Binds the TCP listener, creates the shared registry, and accepts
//! connections, spawning one pipeline per client.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{handle_connection, Registry};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat relay listening on {}", addr);

    // Shared session registry handed to every pipeline
    let registry = Arc::new(Registry::new());

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let registry = Arc::clone(&registry);

                // Spawn pipeline for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, registry).await {
                        error!("Connection pipeline error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
