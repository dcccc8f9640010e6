use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Invalid sensitivity sweep: {0}")]
    InvalidSweep(String),

    #[error("Worker pool could not be started: {0}")]
    ThreadPool(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
