pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod eval;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod sandbox;

use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: `RUST_LOG` filter (default `info`) writing
/// through one locked stdout so concurrent trials never interleave within a line.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(std::io::stdout()))
        .with_target(false)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("tracing initialised");
    }
}
