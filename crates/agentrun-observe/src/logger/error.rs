use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}; expected text, json or journald")]
    InvalidFormat(String),
    #[error("invalid log filter directive {0:?}")]
    InvalidLogLevel(String),
    #[error("journald output requires linux and the `journald` feature")]
    JournaldNotSupported,
    #[error("journald socket unavailable: {0}")]
    JournaldUnavailable(#[source] std::io::Error),
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
    #[error("logger initialization failed: {0}")]
    InitializationFailed(String),
}
