use std::io;
use std::sync::Once;

use config::{Environment, EnvironmentError};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Directives applied when `RUST_LOG` is not set.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn,reqwest=warn";

/// Directives applied to tests when `RUST_LOG` is not set.
const DEFAULT_TEST_DIRECTIVES: &str = "debug,sqlx=warn";

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to read the runtime environment: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("failed to redirect `log` records into tracing: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the non-blocking writer alive; buffered records are flushed when dropped.
#[must_use = "dropping the flusher stops log output"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for a binary.
///
/// Production emits one JSON object per line with the binary name attached; every other
/// environment emits human-readable lines. Records from the `log` facade are forwarded.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;
    LogTracer::init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let (writer, guard) = tracing_appender::non_blocking(io::stdout());

    if environment.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(writer))
            .try_init()?;
    }

    ::tracing::info!(app = app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set. Output goes
/// through the test writer so it is only shown for failing tests.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    if std::env::var_os("ENABLE_TRACING").is_none() {
        return;
    }

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_DIRECTIVES));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
