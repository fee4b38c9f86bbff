use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` wins, then `-v`/`-vv`, then the
/// configured level.
pub fn init(verbosity: u8, configured_level: &str) {
    let level = match verbosity {
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("mediabatch={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("mediabatch=info"));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
