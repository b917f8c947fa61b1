//! Tracing subscriber setup.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Build the level filter: the global level plus per-target overrides
pub fn filter(config: &LoggingConfig) -> Targets {
    Targets::new()
        .with_default(LevelFilter::from(config.level))
        .with_targets(
            config
                .overrides
                .iter()
                .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
        )
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter(config))
        .init();
}
