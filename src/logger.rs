use chrono::Local;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy)]
struct CustomTimer;

impl FormatTime for CustomTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%m%dT%H:%M:%S%.3f"))
    }
}

/// Log output shape, selected via `ZEROLOG_CONFIG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Console,
}

/// Initialize the global subscriber from `ZEROLOG_CONFIG` (json|console) and
/// `ZEROLOG_LOGLEVEL` (an env-filter directive, default "info").
pub fn init_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let format = match std::env::var("ZEROLOG_CONFIG").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Console,
    };
    let level = std::env::var("ZEROLOG_LOGLEVEL").unwrap_or_else(|_| "info".to_string());
    init(format, &level)
}

pub fn init(format: LogFormat, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::new(level);
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stdout)
                        .with_filter(filter),
                )
                .try_init()?;
        }
        LogFormat::Console => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_timer(CustomTimer)
                        .with_writer(std::io::stdout)
                        .with_filter(filter),
                )
                .try_init()?;
        }
    }
    Ok(())
}

/// Console output plus a non-blocking log file. The returned guard must
/// stay alive for the process lifetime or buffered lines are lost.
pub fn init_with_file(
    log_path: impl AsRef<Path>,
    level: &str,
) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let file = std::fs::File::create(log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(CustomTimer)
                .with_writer(std::io::stdout)
                .with_filter(tracing_subscriber::EnvFilter::new(level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(CustomTimer)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::EnvFilter::new(level)),
        )
        .try_init()?;

    Ok(guard)
}
