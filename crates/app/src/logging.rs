use tracing_subscriber::EnvFilter;

/// Initialise logging. `RUST_LOG` picks the level unless `verbose` forces
/// `debug`; without either the level is `info`.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
