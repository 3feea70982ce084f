use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("unauthorized: check client id and access token")]
    Unauthorized,
    #[error("invalid channel login: {0}")]
    InvalidLogin(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("playlist error: {0}")]
    PlaylistError(String),
}

impl PlatformError {
    /// Map a non-success HTTP status to an error.
    pub(crate) fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            Self::Unauthorized
        } else {
            Self::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        }
    }
}
