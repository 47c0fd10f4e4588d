use crawlgraph_source::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Data source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),

    #[error("Refresh controller is busy")]
    ControllerBusy,

    #[error("Refresh controller has shut down")]
    ControllerClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
