use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Failures surfaced by the proxy itself.
///
/// Origin error statuses (404, 500, ...) are not represented here: they are
/// forwarded to the client verbatim. Only problems with the inbound request or
/// with reaching the origin at all become a `ProxyError`.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The `url` query parameter is missing or empty
    #[error("no scrape url provided")]
    MissingTarget,

    /// The `url` query parameter is not a fetchable absolute URL
    #[error("invalid scrape url provided: {0}")]
    InvalidTarget(String),

    /// Network, DNS or TLS failure while talking to the origin
    #[error("origin request failed: {0}")]
    OriginFailure(#[from] reqwest::Error),

    /// Playlist body could not be decoded as text
    #[error("manifest could not be decoded: {0}")]
    ManifestDecode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body returned for every proxy-level failure
#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    message: String,
}

impl ProxyError {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget | ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::OriginFailure(_) | ProxyError::ManifestDecode(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Request errors keep their historical wording so
    /// existing players can match on it.
    fn public_message(&self) -> String {
        match self {
            ProxyError::MissingTarget => "no scrape url provided".to_string(),
            ProxyError::InvalidTarget(_) => "invalid scrape url provided".to_string(),
            ProxyError::OriginFailure(_) => "failed to reach origin".to_string(),
            ProxyError::ManifestDecode(_) => "origin returned an undecodable playlist".to_string(),
            ProxyError::Internal(_) => "internal error".to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        let body = FailureBody {
            success: false,
            message: self.public_message(),
        };

        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
