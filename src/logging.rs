//! Logging setup and per-component loggers
//!
//! Components never reach for a global logger. Each one receives a
//! [`Logger`] in its constructor and derives child loggers from it, so the
//! emitted events carry a dotted component name such as `service.auth`.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing::level_filters::LevelFilter;
use tracing::{Level, Span};
use tracing_subscriber::EnvFilter;

/// Output format of the logs on the standard output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "console" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!(
                "unsupported log format {:?}, expected one of: console, json",
                other
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Console => write!(f, "console"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse the minimum log level to display
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    Level::from_str(level)
        .map(LevelFilter::from_level)
        .map_err(|_| anyhow!("unsupported log level {:?}", level))
}

/// Install the process subscriber.
///
/// `RUST_LOG` takes precedence over `level` when it is set.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(parse_level(level)?.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Console => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow!("could not build the service logger: {}", e))
}

/// Named logging capability handed to each component
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
    span: Span,
}

impl Logger {
    /// Create a top-level logger
    pub fn root(name: &str) -> Self {
        // ERROR level keeps the span enabled under any filter.
        let span = tracing::span!(Level::ERROR, "component", name = %name);
        Self {
            name: name.to_string(),
            span,
        }
    }

    /// Derive a child logger, e.g. `service` -> `service.auth`
    pub fn named(&self, child: &str) -> Self {
        let name = format!("{}.{}", self.name, child);
        let span = tracing::span!(parent: &self.span, Level::ERROR, "component", name = %name);
        Self { name, span }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Span to use as the `parent:` of emitted events
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("console".parse::<LogFormat>().unwrap(), LogFormat::Console);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::INFO);
        assert!(parse_level("chatty").is_err());
    }

    #[test]
    fn test_named_loggers_are_dotted() {
        let service = Logger::root("service");
        let auth = service.named("auth");
        assert_eq!(service.name(), "service");
        assert_eq!(auth.name(), "service.auth");
        assert_eq!(auth.named("tokens").name(), "service.auth.tokens");
    }
}
