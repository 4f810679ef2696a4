use pmoconfig::Config;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

const DEFAULT_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// The level comes from `host.logger.min_level` unless `RUST_LOG` is set.
pub fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .map(|l| l.to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LEVEL.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let subscriber = Registry::default().with(filter);
    if enable_console {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}
