use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure: connection refused, DNS, body decode.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the request.
    #[error("server returned status {status}")]
    Api { status: u16 },
}

impl ClientError {
    /// HTTP status of an API rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status } => Some(*status),
            ClientError::Transport(_) => None,
        }
    }
}
