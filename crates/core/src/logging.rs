//! Diagnostic logging setup
//!
//! Diagnostics go to stderr through `tracing-subscriber`, as human-readable text
//! or one JSON object per line. Stdout stays free for command output. These
//! logs are for whoever runs the orchestrator; the per-gitspace operator
//! narrative lives in [`crate::logstream`].

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Diagnostic output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("Unknown log format: {}. Supported formats: text, json", other),
        }
    }
}

/// Initialize diagnostic logging
///
/// Safe to call more than once; only the first call installs a subscriber.
/// If another global subscriber is already installed (e.g. by a test harness),
/// that one is kept.
///
/// ## Environment Variables
///
/// * `GITSPACE_LOG_FORMAT` - `json` or `text`, used when `format` is `None`
/// * `GITSPACE_LOG` - filter directive, e.g. `gitspace_core=debug`
/// * `RUST_LOG` - fallback filter directive
/// * `GITSPACE_LOG_SPAN_EVENTS` - span lifecycle events to emit
///   (`new`, `close`, `enter`, `exit`, `active`, `full`, `none`, comma separated)
///
/// ## Example
///
/// ```rust
/// use gitspace_core::logging::{self, LogFormat};
///
/// logging::init(Some(LogFormat::Json)).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<LogFormat>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let effective_format = format
            .or_else(|| {
                std::env::var("GITSPACE_LOG_FORMAT")
                    .ok()
                    .and_then(|f| f.parse().ok())
            })
            .unwrap_or_default();

        let span_events = span_events_for_format(effective_format);

        let installed = match effective_format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_events(span_events)
                        .with_writer(io::stderr),
                )
                .with(filter)
                .try_init(),
            LogFormat::Text => tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_span_events(span_events)
                        .with_writer(io::stderr),
                )
                .with(filter)
                .try_init(),
        };

        match installed {
            Ok(()) => tracing::debug!("Logging initialized with format: {}", effective_format.as_str()),
            Err(e) => tracing::debug!("Keeping existing subscriber: {}", e),
        }
    });

    Ok(())
}

/// Filter from `GITSPACE_LOG`, then `RUST_LOG`, defaulting to `info`
fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("GITSPACE_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!(
                "Invalid GITSPACE_LOG specification '{}', using default 'info'",
                spec
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Span lifecycle events; text stays quiet, JSON records span open and close
fn span_events_for_format(format: LogFormat) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    if let Ok(raw) = std::env::var("GITSPACE_LOG_SPAN_EVENTS") {
        return parse_span_events(&raw);
    }

    match format {
        LogFormat::Json => FmtSpan::NEW | FmtSpan::CLOSE,
        LogFormat::Text => FmtSpan::NONE,
    }
}

fn parse_span_events(raw: &str) -> fmt::format::FmtSpan {
    use fmt::format::FmtSpan;

    let mut acc = FmtSpan::NONE;
    for token in raw.split(&[',', '|'][..]).map(|t| t.trim().to_lowercase()) {
        acc |= match token.as_str() {
            "new" => FmtSpan::NEW,
            "close" => FmtSpan::CLOSE,
            "enter" => FmtSpan::ENTER,
            "exit" => FmtSpan::EXIT,
            "active" => FmtSpan::ACTIVE,
            "full" => FmtSpan::FULL,
            _ => FmtSpan::NONE,
        };
    }
    acc
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
