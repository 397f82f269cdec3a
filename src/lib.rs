//! CostBoard - Namespace cost breakdown
//!
//! Pulls windowed cost records from a cost API, groups them by the
//! user that owns each namespace and assembles a stacked chart dataset
//! on every refresh.

pub mod aggregation;
pub mod config;
pub mod dashboard;
pub mod debug_settings;
pub mod sources;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// Console output goes to stderr so JSON written to stdout stays clean.
/// The file layer only writes once `debug_settings::set_file_logging(true)`.
pub fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["costboard=debug", "costboard_lib=debug"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(debug_settings::file_writer()),
        )
        .with(filter)
        .try_init();
}
