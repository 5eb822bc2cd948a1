use thiserror::Error;

pub type SignResult<T> = Result<T, SignError>;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("cookie carries no a1 identity token")]
    MissingIdentity,
    #[error("cannot extract a request path from {0}")]
    InvalidUri(String),
    #[error("malformed percent escape {0:?}")]
    MalformedEscape(String),
    #[error("base64 decode failed: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sign oracle failed: {0}")]
    Oracle(String),
}
