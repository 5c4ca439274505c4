use tracing_subscriber::EnvFilter;

/// Initialize structured logging for the server binary. `RUST_LOG`
/// overrides the default filter.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,felt_web=debug"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // already initialized (tests set their own subscriber)
        tracing::debug!("logging already initialized");
    }
}
