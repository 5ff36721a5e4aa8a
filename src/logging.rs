//! Compact timestamped logging.
//!
//! Quiet (`warn`) by default. `RUST_LOG` overrides the configured levels.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "cssm_watch::pipeline" = "debug"
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config.
///
/// `verbose` raises the default level to at least `info` so that progress
/// lines ("watching", "writing") are shown.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let mut filter_str = if verbose && matches!(config.default.as_str(), "error" | "warn" | "off") {
        "info".to_string()
    } else {
        config.default.clone()
    };
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging. Only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig, verbose: bool) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config, verbose))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Log an event with component context.
///
/// ```ignore
/// log_event!("pipeline", "writing", "{}", path.display());
/// log_event!("watcher", "started");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Log at info when `verbose` is set, at debug otherwise.
#[macro_export]
macro_rules! progress_event {
    ($verbose:expr, $component:expr, $event:expr, $($arg:tt)*) => {
        if $verbose {
            $crate::log_event!($component, $event, $($arg)*)
        } else {
            $crate::debug_event!($component, $event, $($arg)*)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_default_is_quiet() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directives(&config, false), "warn");
    }

    #[test]
    fn test_filter_directives_verbose_raises_level() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directives(&config, true), "info");

        let config = LoggingConfig {
            default: "trace".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(filter_directives(&config, true), "trace");
    }

    #[test]
    fn test_filter_directives_modules() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("cssm_watch::watcher".to_string(), "debug".to_string());
        assert_eq!(
            filter_directives(&config, false),
            "warn,cssm_watch::watcher=debug"
        );
    }
}
