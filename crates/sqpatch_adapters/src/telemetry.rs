use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::subscriber::set_global_default;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Where daily rolling log files are written
pub fn log_directory() -> PathBuf {
    ProjectDirs::from("com", "sqpatch", "sqpatch")
        .map(|d| d.data_local_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber: pretty output on stdout plus a plain
/// daily log file. Keep the returned guard alive until exit so the file
/// writer flushes.
pub fn init_subscriber(name: &str, env_filter: &str) -> WorkerGuard {
    // A logger may already be installed when embedded in a host process
    if LogTracer::init().is_err() {
        eprintln!("log bridge already initialized");
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    let formatting_layer = fmt::layer().with_target(false).pretty();

    let file_appender = tracing_appender::rolling::daily(log_directory(), format!("{}.log", name));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(formatting_layer)
        .with(file_layer);

    if set_global_default(subscriber).is_err() {
        eprintln!("global tracing subscriber already set");
    }

    guard
}
