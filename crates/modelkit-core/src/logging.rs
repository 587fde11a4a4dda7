//! Tracing subscriber setup for binaries and host services embedding ModelKit.

use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between debug output
/// for the ModelKit crates and warnings only.
pub fn init_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .compact()
        .try_init();
}

/// Same as [`init_logging`] but emits one JSON object per event.
pub fn init_json_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .json()
        .try_init();
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("modelkit_core=debug,modelkit_providers=debug,modelkit_verify=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    })
}
