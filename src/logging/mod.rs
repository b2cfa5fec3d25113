//! Logging setup
//!
//! All output goes through `tracing`. `RUST_LOG` takes precedence over the
//! `--verbose` flag when set.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "harbor_replicator=debug"
    } else {
        "harbor_replicator=info"
    }
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose))),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        for verbose in [false, true] {
            let directive = default_directive(verbose);
            assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok());
        }
    }
}
