//! # uplink-demo
//!
//! Demo host process embedding the uplink broadcast server: logs client
//! traffic, echoes `echo`-typed messages back to their sender, and
//! broadcasts a periodic tick with uptime and client count.

#![deny(unsafe_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;
use uplink_core::logging;
use uplink_server::{EventHandlers, ServerConfig, UplinkServer};

/// uplink demo server.
#[derive(Parser, Debug)]
#[command(name = "uplink-demo", about = "uplink broadcast server demo")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "3001")]
    port: u16,

    /// URL path that accepts WebSocket upgrades.
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Seconds between broadcast ticks (0 disables the ticker).
    #[arg(long, default_value = "10")]
    tick_secs: u64,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_path(self.path.clone())
    }
}

/// Handlers that log traffic and echo `echo`-typed messages back.
fn demo_handlers(server: &UplinkServer) -> EventHandlers {
    let echo = server.clone();
    EventHandlers::new()
        .with_on_client_connect(|id| info!(client_id = %id, "client joined"))
        .with_on_client_disconnect(|id| info!(client_id = %id, "client left"))
        .with_on_message(|msg| {
            info!(
                client_id = %msg.client_id,
                message_type = %msg.message_type,
                "message received"
            );
        })
        .with_on_custom_message(move |message_type, data, client_id| {
            if message_type == "echo" {
                let server = echo.clone();
                drop(tokio::spawn(async move {
                    let _ = server
                        .send_to_client_with_type(&client_id, "echo", data)
                        .await;
                }));
            }
        })
}

/// Broadcast a `tick` envelope with uptime and client count on an interval.
fn spawn_ticker(server: UplinkServer, period: Duration, started: Instant) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Skip the immediate first tick
        let _ = interval.tick().await;
        let mut seq = 0_u64;
        loop {
            let _ = interval.tick().await;
            seq += 1;
            let delivered = server
                .send_with_type(
                    "tick",
                    json!({
                        "seq": seq,
                        "uptimeSecs": started.elapsed().as_secs(),
                        "clients": server.client_count(),
                    }),
                )
                .await;
            info!(seq, delivered, "tick broadcast");
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    logging::init_subscriber("info");

    let server = UplinkServer::new(args.server_config());
    server.set_handlers(demo_handlers(&server));

    server.start().await.context("Failed to start server")?;
    let addr = server.local_addr().context("Server has no bound address")?;
    info!("uplink demo listening on ws://{addr}{}", args.path);

    let ticker = (args.tick_secs > 0).then(|| {
        spawn_ticker(
            server.clone(),
            Duration::from_secs(args.tick_secs),
            Instant::now(),
        )
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    server.stop().await;
    info!("Shutdown complete");
    Ok(())
}
