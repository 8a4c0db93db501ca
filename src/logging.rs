use crate::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `config.level`.
///
/// Output goes to stderr so command output on stdout stays clean.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.format.eq_ignore_ascii_case("json") {
        let fmt_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(std::io::stderr);
        subscriber.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr);
        subscriber.with(fmt_layer).try_init()?;
    }

    tracing::debug!(level = %config.level, format = %config.format, "logging initialized");
    Ok(())
}
