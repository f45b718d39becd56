use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    /// The capture never opened. Fatal to the individual start attempt,
    /// recovered by the supervisor's monitor tick.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The capture was open and a read failed. Retried indefinitely inside
    /// the worker.
    #[error("source dropped: {0}")]
    SourceDropped(String),

    #[error("detection error: {0}")]
    Detection(String),

    #[error("camera error: {0}")]
    Camera(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
