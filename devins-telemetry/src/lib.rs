//! Observability setup for DevIns hosts.
//!
//! Libraries in this workspace only emit `tracing` events; binaries call
//! [`init_tracing`] once to install a formatted subscriber.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-column human readable lines.
    #[default]
    Full,
    /// Single-line compact output.
    Compact,
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    filter: String,
    format: LogFormat,
    target: bool,
    span_events: bool,
    respect_env: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_owned(),
            format: LogFormat::Full,
            target: true,
            span_events: false,
            respect_env: true,
        }
    }
}

impl TelemetryConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback filter directive, e.g. `devins_compiler=debug`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Selects the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggles the event target column.
    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.target = enabled;
        self
    }

    /// Emits span close events with their timings.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Ignores `RUST_LOG` and always uses the configured filter.
    #[must_use]
    pub fn ignore_env(mut self) -> Self {
        self.respect_env = false;
        self
    }

    /// Returns the configured filter directive.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Builds the effective filter: `RUST_LOG` when set and honoured,
    /// otherwise the configured directive.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured directive is malformed.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let from_env = self
            .respect_env
            .then(EnvFilter::try_from_default_env)
            .and_then(Result::ok);
        if let Some(filter) = from_env {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.filter)
            .map_err(|err| anyhow!("invalid log filter `{}`: {err}", self.filter))
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is malformed or a global subscriber is
/// already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let span_events = if config.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_target(config.target)
        .with_span_events(span_events);

    let installed = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
