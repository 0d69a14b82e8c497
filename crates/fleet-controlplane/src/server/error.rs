//! HTTP error mapping

use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use fleet_protocol::headers::NEXT_KEEPALIVE_INTERVAL;
use fleet_protocol::ProtocolError;
use fleet_store::StoreError;

use crate::auth::AuthError;
use crate::distribution::DistributionError;
use crate::keepalive::KeepaliveError;

/// Errors returned by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Keepalive(#[from] KeepaliveError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Malformed or incomplete request
    #[error("{0}")]
    BadRequest(String),

    /// Nothing matches the request
    #[error("{0}")]
    NotFound(String),

    /// The request is valid but cannot be served right now
    #[error("{0}")]
    Unavailable(String),
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl ApiError {
    /// Map to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => match e {
                AuthError::Invalid(_) | AuthError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                AuthError::MissingToken
                | AuthError::InvalidToken(_)
                | AuthError::Blacklisted(_)
                | AuthError::BadSignature(_) => StatusCode::UNAUTHORIZED,
                AuthError::NotRegistered(_) => StatusCode::NOT_FOUND,
                AuthError::Store { source, .. } => store_status(source),
            },
            Self::Keepalive(e) => keepalive_status(e),
            Self::Distribution(e) => match e {
                DistributionError::Store { source, .. } => store_status(source),
                DistributionError::NodeUpdate(e) => keepalive_status(e),
            },
            Self::Store(e) => store_status(e),
            Self::Protocol(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

fn keepalive_status(e: &KeepaliveError) -> StatusCode {
    match e {
        KeepaliveError::Store { source, .. } => store_status(source),
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// A rejected node report, answered with the backoff hint
#[derive(Debug)]
pub struct Rejected {
    pub error: ApiError,
    pub next_keepalive: Duration,
}

impl Rejected {
    pub fn new(error: impl Into<ApiError>, next_keepalive: Duration) -> Self {
        Self {
            error: error.into(),
            next_keepalive,
        }
    }
}

impl IntoResponse for Rejected {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        response.headers_mut().insert(
            NEXT_KEEPALIVE_INTERVAL,
            HeaderValue::from(self.next_keepalive.as_secs()),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::NodeId;

    #[test]
    fn test_status_mapping() {
        let unavailable = StoreError::Unavailable("down".into());
        assert_eq!(
            ApiError::from(unavailable).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AuthError::MissingToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::NotRegistered(NodeId::new("n1"))).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(KeepaliveError::Empty).status_code(),
            StatusCode::BAD_REQUEST
        );
        let mismatch = KeepaliveError::NodeIdMismatch {
            authenticated: NodeId::new("n1"),
            reported: "n2".into(),
        };
        assert_eq!(ApiError::from(mismatch).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rejection_carries_backoff_header() {
        let response =
            Rejected::new(AuthError::MissingToken, Duration::from_secs(120)).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(NEXT_KEEPALIVE_INTERVAL).unwrap(),
            "120"
        );
    }
}
