use propdesk_api::NormalizedError;

use crate::session::RefreshError;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{error}")]
    Status { status: u16, error: NormalizedError },

    /// The request was rejected with 401 and the session could not be
    /// renewed. The session has ended by the time this is returned.
    #[error("unauthorized: {0}")]
    Unauthorized(NormalizedError),

    #[error("token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("response carried no token")]
    MissingToken,

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiClientError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized(_) => Some(401),
            Self::Refresh(RefreshError::Status(status)) => Some(*status),
            _ => None,
        }
    }

    /// The error in the shape the UI displays.
    pub fn normalized(&self) -> NormalizedError {
        match self {
            Self::Status { error, .. } | Self::Unauthorized(error) => error.clone(),
            Self::Http(err) if err.status().is_none() => NormalizedError::network(err.to_string()),
            other => NormalizedError {
                status: other.status(),
                message: other.to_string(),
                ..NormalizedError::default()
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_keeps_server_envelope() {
        let err = ApiClientError::Status {
            status: 422,
            error: NormalizedError::from_body(422, br#"{"message":"Price must be positive"}"#),
        };
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.normalized().message, "Price must be positive");
        assert_eq!(err.to_string(), "422: Price must be positive");
    }

    #[test]
    fn refresh_status_is_reported() {
        let err = ApiClientError::from(RefreshError::Status(403));
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.normalized().status, Some(403));
    }
}
