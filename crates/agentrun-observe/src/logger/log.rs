use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::Layered, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Subscriber stack below the output layer.
type Filtered = Layered<EnvFilter, Registry>;
type Output = Box<dyn Layer<Filtered> + Send + Sync>;

/// Compose filter and output layer for `cfg` and install them as the global default.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let output = match cfg.format {
        LoggerFormat::Text => text(cfg),
        LoggerFormat::Json => json(cfg),
        LoggerFormat::Journald => journald()?,
    };

    tracing_subscriber::registry()
        .with(cfg.level.filter()?)
        .with(output)
        .try_init()
        .map_err(|e| {
            // Both the dispatcher and the `log` bridge report a second install as "already ...".
            let msg = e.to_string();
            if msg.contains("already") {
                LoggerError::AlreadyInitialized
            } else {
                LoggerError::InitializationFailed(msg)
            }
        })
}

fn text(cfg: &LoggerConfig) -> Output {
    fmt::layer()
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_timer(local_rfc3339())
        .boxed()
}

fn json(cfg: &LoggerConfig) -> Output {
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(true)
        .with_target(cfg.with_targets)
        .with_timer(local_rfc3339())
        .boxed()
}

/// Local offset when it can be determined, UTC otherwise.
fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald() -> Result<Output, LoggerError> {
    let layer = tracing_journald::layer().map_err(LoggerError::JournaldUnavailable)?;
    Ok(layer.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald() -> Result<Output, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
