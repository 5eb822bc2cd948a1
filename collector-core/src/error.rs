use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::sign::SignError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub type CollectResult<T> = std::result::Result<T, CollectError>;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("invalid locator: {0}")]
    LocatorFormat(String),
    #[error("session expired, refresh the cookie")]
    SessionExpired,
    #[error("upstream format changed: {0}")]
    UpstreamFormatChanged(String),
    #[error("signature rejected by upstream (HTTP {status})")]
    SignatureRejected { status: u16 },
    #[error("sign oracle unavailable: {0}")]
    SignOracleUnavailable(String),
    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },
    #[error("{context} failed: HTTP {status}")]
    Http { status: u16, context: String },
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("item unavailable: {0}")]
    ItemUnavailable(String),
    #[error("entitlement denied ({code}): {message}")]
    EntitlementDenied { code: i64, message: String },
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl CollectError {
    /// Errors that abort a run even when raised while resolving a single item.
    ///
    /// `UpstreamFormatChanged` is terminal for the target or page that raised
    /// it, but a single detail payload with an unexpected shape only fails
    /// that item.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            CollectError::SessionExpired
                | CollectError::SignatureRejected { .. }
                | CollectError::SignOracleUnavailable(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CollectError::LocatorFormat(_) => "locator_format",
            CollectError::SessionExpired => "session_expired",
            CollectError::UpstreamFormatChanged(_) => "upstream_format_changed",
            CollectError::SignatureRejected { .. } => "signature_rejected",
            CollectError::SignOracleUnavailable(_) => "sign_oracle_unavailable",
            CollectError::Upstream { .. } => "upstream",
            CollectError::Http { .. } => "http",
            CollectError::Timeout(_) => "timeout",
            CollectError::Transport(_) => "transport",
            CollectError::ItemUnavailable(_) => "item_unavailable",
            CollectError::EntitlementDenied { .. } => "entitlement_denied",
            CollectError::Sign(_) => "sign",
            CollectError::Json(_) => "json",
            CollectError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_fatal_classification() {
        assert!(CollectError::SessionExpired.is_run_fatal());
        assert!(CollectError::SignatureRejected { status: 406 }.is_run_fatal());
        assert!(CollectError::SignOracleUnavailable("missing".into()).is_run_fatal());
        assert!(!CollectError::Timeout("feed".into()).is_run_fatal());
        assert!(!CollectError::ItemUnavailable("no items".into()).is_run_fatal());
        assert!(!CollectError::UpstreamFormatChanged("note_card".into()).is_run_fatal());
        assert_eq!(CollectError::SessionExpired.kind(), "session_expired");
    }
}
