//! Tracing setup. The subscriber starts at `info` and is re-filtered once
//! `[logging]` has been loaded.

use std::fmt;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt as log_fmt, prelude::*, reload};

use crate::config::LoggingConfig;

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Dependencies that are noisy below `warn`, unless the configured level is
/// `off`.
const QUIET_TARGETS: &[&str] = &["hyper_util", "h2", "redis", "deadpool"];

/// Where the active filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFilterSource {
    Environment,
    Config,
}

impl fmt::Display for LogFilterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFilterSource::Environment => write!(f, "RUST_LOG"),
            LogFilterSource::Config => write!(f, "logging.level"),
        }
    }
}

/// `RUST_LOG` wins when it parses; otherwise the configured level applies to
/// the service with the quiet targets capped at `warn`.
pub fn build_filter(cfg: &LoggingConfig, rust_log: Option<&str>) -> (EnvFilter, LogFilterSource) {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return (filter, LogFilterSource::Environment),
            Err(e) => eprintln!("Ignoring invalid RUST_LOG '{directives}': {e}"),
        }
    }

    let level = cfg.level.to_ascii_lowercase();
    let mut directives = vec![level.clone()];
    if level != "off" {
        directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    }
    let filter = EnvFilter::try_new(directives.join(","))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    (filter, LogFilterSource::Config)
}

/// Installs the global subscriber with the default logging settings.
pub fn init_tracing() {
    let rust_log = std::env::var("RUST_LOG").ok();
    let (filter, _) = build_filter(&LoggingConfig::default(), rust_log.as_deref());

    let (reload_layer, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(log_fmt::layer())
        .try_init();
}

/// Swaps in the filter for the loaded `[logging]` section. Returns `None`
/// when no subscriber was installed through [`init_tracing`].
pub fn apply_logging(cfg: &LoggingConfig) -> Option<LogFilterSource> {
    let handle = FILTER_HANDLE.get()?;
    let rust_log = std::env::var("RUST_LOG").ok();
    let (filter, source) = build_filter(cfg, rust_log.as_deref());
    if let Err(e) = handle.reload(filter) {
        eprintln!("Failed to apply logging filter: {e}");
        return None;
    }
    tracing::info!(source = %source, level = %cfg.level, "log filter applied");
    Some(source)
}
