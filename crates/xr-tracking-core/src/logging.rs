//! Tracing subscriber bootstrap

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xr_tracking_config::LoggingConfig;

/// Install a stderr fmt subscriber. `RUST_LOG` wins over the configured
/// level. Returns false when a global subscriber was already set.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig {
            level: "not a [valid filter".to_string(),
        };
        init(&config);
        assert!(!init(&LoggingConfig::default()));
    }
}
