//! Telemetry and logging
//!
//! Structured logs go to a daily-rolling JSON file under the log directory.
//! A compact console layer is added in verbose mode. `RUST_LOG` overrides the
//! default filter.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rolling log
pub const LOG_FILE_NAME: &str = "mine_agent.log";

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug,hyper=info,reqwest=info,h2=info,rustls=info"
    } else {
        "info,hyper=warn,reqwest=warn,h2=warn,rustls=warn"
    }
}

/// Owns the background log writer; logs are flushed when this is dropped
pub struct Telemetry {
    log_dir: PathBuf,
    _file_guard: WorkerGuard,
}

impl Telemetry {
    /// Install the global subscriber. If one is already installed (tests,
    /// embedding hosts) it is left in place and only the file writer is set up.
    pub fn init(log_dir: PathBuf, verbose: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

        if verbose {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
        }

        tracing::info!(log_dir = %log_dir.display(), verbose, "Telemetry initialized");

        Ok(Self {
            log_dir,
            _file_guard: file_guard,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("logs");

        let telemetry = Telemetry::init(dir.clone(), false).unwrap();
        assert!(dir.is_dir());
        assert_eq!(telemetry.log_dir(), dir.as_path());

        // A second init must not fail even though a subscriber exists
        let again = Telemetry::init(dir.clone(), true);
        assert!(again.is_ok());
    }

    #[test]
    fn test_default_filter() {
        assert!(default_filter(true).starts_with("debug"));
        assert!(default_filter(false).starts_with("info"));
        assert!(default_filter(false).contains("reqwest=warn"));
    }
}
