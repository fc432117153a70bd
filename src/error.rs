use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout error")]
    TimeoutError,

    #[error("Malformed introspection data: {0}")]
    MalformedData(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Process memory introspection is not supported on {0}")]
    PlatformUnsupported(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[cfg(feature = "prometheus")]
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] ::prometheus::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
