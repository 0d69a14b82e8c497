//! Request extractors

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use fleet_core::NodeId;

use super::error::Rejected;
use crate::geoip::client_ip;
use crate::state::ControlPlaneState;

/// The node a bearer token was issued to
#[derive(Debug, Clone)]
pub struct AuthenticatedNode(pub NodeId);

fn bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let value = value.trim();
    Some(
        value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value),
    )
}

#[axum::async_trait]
impl FromRequestParts<Arc<ControlPlaneState>> for AuthenticatedNode {
    type Rejection = Rejected;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ControlPlaneState>,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth
            .authenticate(bearer(parts))
            .await
            .map(AuthenticatedNode)
            .map_err(|e| Rejected::new(e, state.keepalive.backoff_interval()))
    }
}

/// The first public address the request came from, if any
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}
