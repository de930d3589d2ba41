//! Command-line arguments for the binaries under `src/app/`.

use tracing_subscriber::EnvFilter;

pub mod coordinator;
pub mod ctl;
pub mod sequential;
pub mod worker;

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
