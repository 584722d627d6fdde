//! Period-over-period loading reports and detention summaries for railway
//! operations data.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod detention;
pub mod error;
pub mod loader;
pub mod output;
pub mod period;
pub mod presentation;
pub mod reports;
pub mod store;
pub mod types;
pub mod util;

use once_cell::sync::OnceCell;

static TRACING: OnceCell<()> = OnceCell::new();

/// Install the global `tracing` subscriber once. `RUST_LOG` overrides the
/// default `rail_report=info`.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rail_report=info"));
        // A test harness may already have installed one.
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    });
}
