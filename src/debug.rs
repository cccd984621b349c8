//! Logging bridge for oomph-loader.
//!
//! Routes every `log::info!()` etc. from the loader and its crates to stderr,
//! leaving stdout to the supervised binary, which shares our terminal.
//!
//! Level precedence: `--log-level` flag, then `RUST_LOG` (a bare level name
//! such as `debug`), then `info`.
//!
//! Lines look like:
//!
//! ```text
//! [2026-10-18 12:00:00.123] [INFO ] [oomph_loader_update::cache] Latest version is already installed.
//! ```

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;

use log::{LevelFilter, Log, Metadata, Record};

/// Crates whose records pass at any enabled level. Everything else (HTTP and
/// TLS internals) is capped at `Info`.
const OWN_TARGETS: &[&str] = &["oomph_loader"];

/// `log` backend writing formatted lines to stderr.
pub struct LogBridge {
    level: LevelFilter,
}

impl LogBridge {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    fn format(record: &Record<'_>) -> String {
        let level = match record.level() {
            log::Level::Error => "ERROR",
            log::Level::Warn => "WARN ",
            log::Level::Info => "INFO ",
            log::Level::Debug => "DEBUG",
            log::Level::Trace => "TRACE",
        };
        format!(
            "[{}] [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            record.target(),
            record.args()
        )
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        let own = OWN_TARGETS
            .iter()
            .any(|prefix| metadata.target().starts_with(prefix));
        let limit = if own {
            self.level
        } else {
            self.level.min(LevelFilter::Info)
        };
        metadata.level() <= limit
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        // Nowhere left to report a failed stderr write
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<LogBridge> = OnceLock::new();

/// Resolve the effective level from the CLI flag and `RUST_LOG`.
pub fn resolve_level(cli_level: Option<LevelFilter>, env_value: Option<&str>) -> LevelFilter {
    cli_level
        .or_else(|| env_value.and_then(|v| LevelFilter::from_str(v.trim()).ok()))
        .unwrap_or(LevelFilter::Info)
}

/// Install the bridge as the global logger. Later calls are no-ops.
pub fn init_log_bridge(cli_level: Option<LevelFilter>) {
    let env_value = std::env::var("RUST_LOG").ok();
    let level = resolve_level(cli_level, env_value.as_deref());
    let logger = LOGGER.get_or_init(|| LogBridge::new(level));

    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level());
    }
}
