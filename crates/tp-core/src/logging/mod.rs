//! Logging setup for tp-core.
//!
//! Run lines are built as [`LogEvent`]s (see [`events`]) and handed to a
//! sink; the `TracingSink` forwards them to the subscriber installed here.
//! Console text suits interactive use, JSONL pairs with machine output on
//! stdout. All log output goes to stderr.

pub mod events;

pub use events::{event_names, LogContext, LogEvent, Severity, Stage, StageLog};

use std::io::IsTerminal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the tp-core log level, e.g. `TP_LOG=debug`.
pub const LOG_LEVEL_ENV: &str = "TP_LOG";

/// Shape of the stderr log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    Console,
    Jsonl,
}

/// What the command line asked of logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub style: LogStyle,
    /// Level forced by `-q`/`-v`; `None` defers to the environment.
    pub level: Option<LevelFilter>,
}

impl LogSettings {
    /// `-q` keeps errors only, `-v` adds debug lines and `-vv` traces.
    /// Machine output on stdout switches stderr to JSONL.
    pub fn from_flags(quiet: bool, verbose: u8, machine_output: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => Some(LevelFilter::ERROR),
            (false, 0) => None,
            (false, 1) => Some(LevelFilter::DEBUG),
            (false, _) => Some(LevelFilter::TRACE),
        };
        let style = if machine_output {
            LogStyle::Jsonl
        } else {
            LogStyle::Console
        };
        LogSettings { style, level }
    }

    /// Filter directive for the subscriber.
    ///
    /// A CLI level wins, then `TP_LOG`, then `info`. Unparseable `TP_LOG`
    /// values are ignored.
    fn directive(&self, tp_log: Option<&str>) -> String {
        let level = self
            .level
            .or_else(|| tp_log.and_then(|v| v.trim().parse::<LevelFilter>().ok()))
            .unwrap_or(LevelFilter::INFO);
        format!("tp_core={}", level).to_lowercase()
    }
}

/// Install the global subscriber. A second call is a no-op.
///
/// `RUST_LOG` replaces the computed filter entirely unless the command line
/// forced a level.
pub fn init_logging(settings: &LogSettings) {
    let tp_log = std::env::var(LOG_LEVEL_ENV).ok();
    let directive = settings.directive(tp_log.as_deref());
    let filter = if settings.level.is_some() {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match settings.style {
        LogStyle::Console => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init(),
        LogStyle::Jsonl => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
}

/// Stable id of this machine for log correlation.
///
/// Prefers `/etc/machine-id`, then a hash of `HOSTNAME`, then a random id.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 && id.is_ascii() {
            return format!("host-{}", &id[..8]);
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        return format!("host-{:08x}", hostname_hash(&hostname) as u32);
    }

    format!("host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn hostname_hash(s: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_pick_level_and_style() {
        let quiet = LogSettings::from_flags(true, 2, false);
        assert_eq!(quiet.level, Some(LevelFilter::ERROR));
        assert_eq!(quiet.style, LogStyle::Console);

        assert_eq!(LogSettings::from_flags(false, 0, true).level, None);
        assert_eq!(LogSettings::from_flags(false, 1, true).level, Some(LevelFilter::DEBUG));
        assert_eq!(LogSettings::from_flags(false, 3, true).level, Some(LevelFilter::TRACE));
        assert_eq!(LogSettings::from_flags(false, 0, true).style, LogStyle::Jsonl);
    }

    #[test]
    fn test_directive_precedence() {
        let deferred = LogSettings::from_flags(false, 0, false);
        assert_eq!(deferred.directive(None), "tp_core=info");
        assert_eq!(deferred.directive(Some("warn")), "tp_core=warn");
        assert_eq!(deferred.directive(Some("loud")), "tp_core=info");

        let verbose = LogSettings::from_flags(false, 1, false);
        assert_eq!(verbose.directive(Some("warn")), "tp_core=debug");
    }

    #[test]
    fn test_get_host_id() {
        let host_id = get_host_id();
        assert!(host_id.starts_with("host-"));
        assert_eq!(host_id.len(), 13);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(&LogSettings::from_flags(true, 0, false));
        init_logging(&LogSettings::from_flags(false, 0, true));
    }
}
