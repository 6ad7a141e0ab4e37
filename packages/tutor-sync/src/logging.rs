use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "tutor-sync.log";

pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    /// Daily-rolling file output is written here when set.
    pub file_dir: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_env(level: &str) -> Self {
        let file_enabled = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let file_dir = file_enabled.then(|| {
            std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs"))
        });

        Self {
            level: level.to_string(),
            file_dir,
        }
    }
}

/// Installs the global subscriber. Diagnostics go to stderr so the binary's
/// JSON output on stdout stays clean.
pub fn init_tracing(settings: &LogSettings) -> Option<FileLogGuard> {
    let env_filter =
        EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let Some(log_dir) = settings.file_dir.as_ref() else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return None;
    };

    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!("failed to create log directory {}: {err}", log_dir.display());
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Some(FileLogGuard { _guard: guard })
}
