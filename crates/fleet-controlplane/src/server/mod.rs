//! HTTP surface
//!
//! Node-facing endpoints (registration, login, keepalive, configuration and
//! metrics) and the operator views over the registry and the store. This is
//! the only layer that decides status codes.

mod admin;
mod error;
mod extract;
mod node;

pub use error::{ApiError, Rejected};
pub use extract::{AuthenticatedNode, ClientIp};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::state::ControlPlaneState;

/// Error code carried by a failed [`ApiResult`]
pub const API_ERR_CODE: i32 = -1;

/// JSON envelope of the operator endpoints
#[derive(Debug, Serialize)]
pub struct ApiResult<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            msg: String::new(),
            data: Some(data),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            code: API_ERR_CODE,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Build the router for every endpoint.
pub fn router(state: Arc<ControlPlaneState>) -> Router {
    let node_routes = Router::new()
        .route("/node/keepalive", post(node::keepalive))
        .route("/config/apps", get(node::config_apps))
        .route("/push/metrics", post(node::push_metrics))
        .route("/node/regist", get(node::regist))
        .route("/node/regist/wallet", get(node::regist_wallet))
        .route("/node/login", get(node::login))
        .route("/sign/verify", post(node::sign_verify))
        .route("/update/lua", get(node::update_lua))
        .route("/config/controller", get(node::controller_config));

    let admin_routes = Router::new()
        .route("/agents", get(admin::agents))
        .route("/controllers", get(admin::controllers))
        .route("/node/list", get(admin::node_list))
        .route("/node/info", get(admin::node_info))
        .route("/node/apps", get(admin::node_apps))
        .route(
            "/node/configs",
            get(admin::get_node_configs).post(admin::set_node_configs),
        )
        .route("/health", get(admin::health));

    Router::new()
        .merge(node_routes)
        .merge(admin_routes)
        .with_state(state)
}

/// Serve until `cancel` fires, then drain in-flight requests.
pub async fn serve(
    state: Arc<ControlPlaneState>,
    addr: &str,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
}
