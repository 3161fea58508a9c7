use reqwest::StatusCode;
use thiserror::Error;

/// Failures the service client can report.
///
/// The session loop only branches on [`ClientError::CatalogNotReady`]; the
/// rest is logged and surfaced verbatim.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS trouble, or the transport timeout elapsing.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("malformed response payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// A recommendation was requested before any catalog sync. Distinct from
    /// the other failures so callers can prompt for a sync instead of
    /// retrying.
    #[error("no catalog available; sync a playlist before requesting recommendations")]
    CatalogNotReady,

    #[error("catalog sync failed: {0}")]
    SyncFailed(String),
}

impl ClientError {
    pub fn is_catalog_not_ready(&self) -> bool {
        matches!(self, ClientError::CatalogNotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ClientError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "image could not be decoded".into(),
        };
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("image could not be decoded"));

        let err = ClientError::SyncFailed("playlist fetch failed".into());
        assert!(err.to_string().contains("playlist fetch failed"));
    }

    #[test]
    fn test_catalog_not_ready_predicate() {
        assert!(ClientError::CatalogNotReady.is_catalog_not_ready());
        let other = ClientError::SyncFailed("x".into());
        assert!(!other.is_catalog_not_ready());
    }
}
