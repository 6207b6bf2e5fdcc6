use anyhow::Context;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

pub fn init(cfg: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let env_filter = if let Ok(v) = std::env::var("RUST_LOG") {
        EnvFilter::new(v)
    } else {
        EnvFilter::new(format!("{},kiwi_client={},kiwi_core={}", cfg.level, cfg.level, cfg.level))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    let (file_layer, file_guard) = match &cfg.log_dir {
        None => (None, None),
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "kiwirecorder");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(stderr_layer);
    match file_layer {
        None => registry.init(),
        Some(layer) => registry.with(layer).init(),
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

pub fn default_log_dir() -> PathBuf {
    Path::new("logs").to_path_buf()
}
