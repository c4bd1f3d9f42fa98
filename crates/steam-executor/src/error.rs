use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Steam reported that the external cluster could not be started.
    #[error("Failed to start external cluster: {0}")]
    StartFailed(String),
    /// Steam did not report the outcome of the start request in time.
    #[error("No response received from Steam.")]
    StartTimedOut,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("error in JSON serialization: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("error in WebSocket: {0}")]
    WebSocketError(#[from] tungstenite::Error),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ExecutorError {
    pub fn internal(message: impl Into<String>) -> Self {
        ExecutorError::InternalError(message.into())
    }
}

impl<T> From<mpsc::error::SendError<T>> for ExecutorError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ExecutorError::internal("the executor starter has stopped")
    }
}
