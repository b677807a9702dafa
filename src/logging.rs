//! Tracing subscriber setup
//!
//! Console output goes to stderr so stdout stays free for the approval prompt.
//! With a log directory configured, a daily rolling file is written as well.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::platform_dirs::ensure_dir;

const LOG_FILE_PREFIX: &str = "mcp-gateway.log";

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// Calling this a second time leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> GatewayResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (json_layer, text_layer) = match &config.directory {
        Some(dir) => {
            ensure_dir(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            if config.json {
                (
                    Some(fmt::layer().json().with_writer(appender).with_ansi(false)),
                    None,
                )
            } else {
                (None, Some(fmt::layer().with_writer(appender).with_ansi(false)))
            }
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init();

    Ok(())
}

/// Filter for a configured level string such as `info` or `mcp_gateway=debug,warn`
pub fn level_filter(level: &str) -> GatewayResult<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| GatewayError::invalid_config(format!("Invalid log level '{}': {}", level, e)))
}
