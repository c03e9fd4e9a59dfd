//! Diagnostic logging on stderr.
//!
//! `RUST_LOG` takes precedence over the `[logging]` section:
//!
//! ```bash
//! RUST_LOG=rag_index::indexer=debug ragx refresh
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Build the filter directive string from config (`default,target=level,...`).
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{}={}", module, level));
    }
    directives
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .with_filter(filter);

        // A subscriber may already be installed by an embedding application.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
