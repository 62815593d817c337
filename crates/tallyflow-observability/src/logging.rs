//! Structured logging setup for Tallyflow binaries

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log directive: {0}")]
    Directive(String),

    #[error("Global subscriber already set: {0}")]
    AlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Map a configured level name onto a tracing level, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter used by [`init_logging`]
///
/// Extra directives (e.g. `tallyflow_fetch=debug`) are layered on top of the
/// base level. `RUST_LOG` is not consulted; the config file is the source.
pub fn build_filter(level: &str, directives: &[String]) -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::new(parse_level(level).to_string());
    for directive in directives {
        let parsed = directive
            .parse()
            .map_err(|_| LoggingError::Directive(directive.clone()))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Install the global tracing subscriber, writing to stderr
pub fn init_logging(
    level: &str,
    format: LogFormat,
    directives: &[String],
) -> Result<(), LoggingError> {
    let filter = build_filter(level, directives)?;

    match format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
