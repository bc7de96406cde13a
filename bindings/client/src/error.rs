use std::time::Duration;

/// Why a request to the rule engine did not produce the expected response.
///
/// Every variant is recorded as a failed operation before it is returned.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("Request to {url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl RequestError {
    /// The HTTP status, if the server responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type RequestResult<T> = Result<T, RequestError>;
