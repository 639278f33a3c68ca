//! Logging initialization
//!
//! `RUST_LOG` overrides the configured level. File output goes through a
//! non-blocking writer whose guard must outlive the server:
//!
//! ```rust,no_run
//! use campus_server::config::LoggingConfig;
//!
//! let _guard = LoggingConfig::production("/var/log/campus").init()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! | Output | Guard |
//! |--------|-------|
//! | `Stderr` | no |
//! | `FileOnly` | yes |
//! | `Both` | yes |
//! | `None` | no |

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogOutput, LogRotation, LoggingConfig};

/// Flushes buffered file logs on drop; hold it until shutdown
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    _stderr_guard: Option<WorkerGuard>,
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// Returns `Some(LoggingGuard)` when logs go to files.
    ///
    /// # Errors
    ///
    /// Returns an error if file output has no directory, the directory cannot
    /// be created or a subscriber is already installed.
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.output {
            LogOutput::None => Ok(None),
            LogOutput::Stderr => {
                init_stderr(self, filter)?;
                Ok(None)
            }
            LogOutput::FileOnly => {
                let appender = file_appender(self)?;
                let (writer, guard) = tracing_appender::non_blocking(appender);
                install(self, filter, writer)?;
                Ok(Some(LoggingGuard {
                    _file_guard: guard,
                    _stderr_guard: None,
                }))
            }
            LogOutput::Both => {
                let appender = file_appender(self)?;
                let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
                let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(io::stderr());
                install(self, filter, file_writer.and(stderr_writer))?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: Some(stderr_guard),
                }))
            }
        }
    }
}

fn init_stderr(config: &LoggingConfig, filter: EnvFilter) -> io::Result<()> {
    install(config, filter, io::stderr)
}

fn install<W>(config: &LoggingConfig, filter: EnvFilter, writer: W) -> io::Result<()>
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry().with(filter);
    if config.structured {
        subscriber
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    } else {
        subscriber
            .with(fmt::layer().with_writer(writer))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

fn file_appender(config: &LoggingConfig) -> io::Result<RollingFileAppender> {
    let dir: &Path = config.directory.as_deref().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "File logging requires logging.directory",
        )
    })?;
    std::fs::create_dir_all(dir)?;

    let prefix = &config.file_prefix;
    Ok(match config.rotation {
        LogRotation::Minute => tracing_appender::rolling::minutely(dir, prefix),
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_only_requires_directory() {
        let config = LoggingConfig {
            output: LogOutput::FileOnly,
            directory: None,
            ..LoggingConfig::default()
        };
        let error = config.init().unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_disabled_logging_needs_no_guard() {
        let config = LoggingConfig {
            output: LogOutput::None,
            ..LoggingConfig::default()
        };
        assert!(config.init().unwrap().is_none());
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested/logs");
        let config = LoggingConfig {
            directory: Some(dir.clone()),
            ..LoggingConfig::default()
        };
        file_appender(&config).unwrap();
        assert!(dir.is_dir());
    }
}
