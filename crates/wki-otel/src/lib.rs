use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install the process-wide subscriber: console output filtered by
/// `RUST_LOG` (default `info`), plus a rolling file when `WKI_LOG_ROLL=1`.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(settings) = FileSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };

    if std::fs::create_dir_all(&settings.dir).is_err() {
        tracing::warn!(directory = %settings.dir, "failed to create log directory");
    }
    let writer = match settings.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&settings.dir, &settings.prefix),
        "minutely" => tracing_appender::rolling::minutely(&settings.dir, &settings.prefix),
        _ => tracing_appender::rolling::daily(&settings.dir, &settings.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = FILE_GUARD.set(guard);
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(nb)
        .with_filter(file_filter);
    let _ = registry.with(file_layer).try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileSettings {
    dir: String,
    prefix: String,
    rotation: String,
}

impl FileSettings {
    fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if lookup("WKI_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: lookup("WKI_LOGS_DIR").unwrap_or_else(|| "logs".to_string()),
            prefix: lookup("WKI_LOG_PREFIX").unwrap_or_else(|| "wki-server".to_string()),
            rotation: lookup("WKI_LOG_ROTATION")
                .unwrap_or_else(|| "daily".to_string())
                .to_lowercase(),
        })
    }
}
