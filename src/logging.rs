use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_DIR_ENV: &str = "KUBETEST_AZURE_LOG_DIR";
const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "kubetest-azure.log";

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stdout,
/// plus a daily rolling file when `KUBETEST_AZURE_LOG_DIR` is set.
///
/// Keep the returned guard alive until exit or buffered file output is lost.
pub fn init_tracing() -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
