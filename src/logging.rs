use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer flushing; drop it only at shutdown.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Installs the engine's global tracing subscriber: env-filtered stdout
/// output, plus a daily-rolling `engine.log` under `log_dir` when the host
/// provides one. Returns the flush guard for the file writer, if any.
///
/// The host application decides whether file logging is wanted; the engine
/// takes no environment variables here.
pub fn init_tracing(filter: &str, log_dir: Option<&Path>) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, dir, "engine.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(FileLogGuard { _guard: guard }))
            }
            Err(err) => {
                // Same policy as snapshot persistence: a broken log sink
                // must not take the engine down.
                eprintln!("failed to create log directory {}: {err}", dir.display());
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}
