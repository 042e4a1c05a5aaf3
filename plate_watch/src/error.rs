use thiserror::Error;

/// Errors raised by the plate recognition pipeline and its adapters.
#[derive(Debug, Error)]
pub enum PlateError {
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("ocr: {0}")]
    Ocr(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("registry: {0}")]
    Registry(String),

    #[error("http: {0}")]
    Http(String),

    #[error("stream: {0}")]
    Stream(String),

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlateError>;
