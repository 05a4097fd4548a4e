use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use loom_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Install the global subscriber. Logs go to stderr so stdout stays
/// parseable; `RUST_LOG` overrides the configured level.
///
/// Keep the returned guard alive until exit or buffered file lines are lost.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let stderr_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer().json().with_writer(io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(io::stderr).boxed()
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("logging.file must name a file: {}", path.display()))?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}
