use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MonitorError {
    #[error("printer control error: {0}")]
    Control(String),
    #[error("printer link fault: {0}")]
    LinkFault(String),
    #[error("timeout waiting for printer")]
    Timeout,
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing printer control")]
    MissingControl,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
