//! Tracing subscriber setup for the server binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by
/// `default_level` for the cardroom crates when `RUST_LOG` is unset.
///
/// Calling this twice is a no-op.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cardroom={default_level},cardroom_room={default_level},\
             cardroom_protocol={default_level},cardroom_server={default_level},\
             tower_http=info"
        ))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
