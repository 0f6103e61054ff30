//! Cardroom backend server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin cardroom-server
//! cargo run --bin cardroom-server -- --host 0.0.0.0 --port 3000 --heartbeat-secs 20
//! ```

use std::time::Duration;

use cardroom::prelude::*;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cardroom-server")]
#[command(about = "Long-poll messaging backend for card game rooms", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Seconds between heartbeat sweeps. Players are probed after one
    /// silent interval and evicted after two.
    #[arg(long, default_value = "40", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_secs: u64,

    /// Seconds a listen request blocks before a 504. Defaults to four
    /// heartbeat intervals.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    listen_timeout_secs: Option<u64>,

    /// Pending payloads each player's mailbox holds
    #[arg(long, default_value = "20", value_parser = parse_capacity)]
    mailbox_capacity: usize,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_capacity(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("mailbox capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let heartbeat = Duration::from_secs(self.heartbeat_secs);
        let room = RoomConfig {
            mailbox_capacity: self.mailbox_capacity,
            ..RoomConfig::with_heartbeat_interval(heartbeat)
        };
        let listen_timeout = self
            .listen_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(heartbeat * 4);

        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            listen_timeout,
            room,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    cardroom::logging::init(&args.log_level);

    let server = match CardroomServer::builder()
        .config(args.server_config())
        .build()
        .await
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
