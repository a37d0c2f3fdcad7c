use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// `default_filter` is used when `RUST_LOG` is unset, e.g. `"info"` or
/// `"jobwork_engine=debug,sea_orm=warn"`. Safe to call more than once; only
/// the first call installs a subscriber.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
