//! Log subscriber setup.
//!
//! The driver logs through `tracing`; the host selects verbosity with
//! [`Config::log_level`](crate::config::Config). Initialization is best
//! effort: if the embedding process already installed a subscriber, the
//! existing one stays in place.

use crate::config::Config;
use tracing_subscriber::EnvFilter;

/// Initialize a fmt subscriber honoring the configured log level.
///
/// `RUST_LOG` takes precedence when set. With `http_debug` enabled the
/// filter also opens up the AWS SDK internals so wire-level request logs
/// become visible.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.log_level.as_filter();
        let directives = if config.http_debug {
            format!("{level},aws_smithy_runtime=debug,aws_sdk_s3=debug")
        } else {
            level.to_string()
        };
        EnvFilter::new(directives)
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_init_is_idempotent() {
        let config = Config {
            log_level: LogLevel::Debug,
            ..Config::default()
        };
        init(&config);
        init(&config);
    }
}
