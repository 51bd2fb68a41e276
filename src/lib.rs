pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod service;

pub use config::ModerationConfig;
pub use error::ModerationError;
pub use service::ModerationService;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
