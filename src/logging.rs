use std::io;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Configures the stdout and rolling-file log layers. Call once at
/// startup; RUST_LOG overrides the stdout defaults.
pub fn configure_logging() {
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,llm_request=info,pipeline=info"));

    let stdout_log = fmt::layer().with_writer(io::stdout).with_filter(stdout_filter);

    // File log configuration
    let file_appender = tracing_appender::rolling::daily("logs", "newsreel.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug,llm_request=debug,pipeline=debug"));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}
