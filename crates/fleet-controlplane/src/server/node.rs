//! Node-facing handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleet_core::time::now;
use fleet_protocol::headers::{INIT_STATE, NEXT_KEEPALIVE_INTERVAL, SERVICE_STATE, WEB_SERVER};
use fleet_protocol::{
    ControllerQuery, DeviceReport, LoginQuery, RegisterQuery, ResourceQuery, SignVerifyRequest,
};
use tracing::{debug, info};

use super::error::{ApiError, Rejected};
use super::extract::{AuthenticatedNode, ClientIp};
use super::ApiResult;
use crate::distribution::DistributionRequest;
use crate::state::ControlPlaneState;

type AppState = State<Arc<ControlPlaneState>>;

fn param(params: &HashMap<String, String>, key: &str) -> String {
    params.get(key).cloned().unwrap_or_default()
}

/// `POST /node/keepalive`
pub async fn keepalive(
    State(state): AppState,
    AuthenticatedNode(id): AuthenticatedNode,
    ClientIp(ip): ClientIp,
    body: Bytes,
) -> Result<impl IntoResponse, Rejected> {
    let keepalive = &state.keepalive;
    keepalive
        .keepalive(&id, &body, ip, now())
        .await
        .map_err(|e| Rejected::new(e, keepalive.backoff_interval()))?;
    Ok([(
        NEXT_KEEPALIVE_INTERVAL,
        keepalive.steady_interval().as_secs().to_string(),
    )])
}

/// `GET /config/apps`
pub async fn config_apps(
    State(state): AppState,
    AuthenticatedNode(id): AuthenticatedNode,
    ClientIp(ip): ClientIp,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, Rejected> {
    let request = DistributionRequest {
        node_id: id,
        uuid: param(&params, "uuid"),
        channel: param(&params, "channel"),
        device: DeviceReport::from_query(&params),
        resources: ResourceQuery::from_query(&params),
        ip,
    };
    let decision = state
        .distribution
        .decide(&request, now())
        .await
        .map_err(|e| Rejected::new(e, state.keepalive.backoff_interval()))?;

    Ok((
        [
            (SERVICE_STATE, decision.service_state.code().to_string()),
            (INIT_STATE, decision.init_state.code().to_string()),
        ],
        Json(decision.apps),
    )
        .into_response())
}

/// `POST /push/metrics`
pub async fn push_metrics(
    State(state): AppState,
    AuthenticatedNode(id): AuthenticatedNode,
    ClientIp(ip): ClientIp,
    body: Bytes,
) -> Result<StatusCode, Rejected> {
    let verdict = state
        .keepalive
        .push_metrics(&id, &body, ip, now())
        .await
        .map_err(|e| Rejected::new(e, state.keepalive.backoff_interval()))?;
    debug!("Metrics from {}: verdict {:?}", id, verdict.status);
    Ok(StatusCode::OK)
}

/// `GET /node/regist`
pub async fn regist(
    State(state): AppState,
    Query(query): Query<RegisterQuery>,
) -> Result<StatusCode, ApiError> {
    state.auth.register(&query, now()).await?;
    Ok(StatusCode::OK)
}

/// `GET /node/regist/wallet`
pub async fn regist_wallet(
    State(state): AppState,
    Query(query): Query<RegisterQuery>,
) -> Result<StatusCode, ApiError> {
    state.auth.register_wallet(&query, now()).await?;
    Ok(StatusCode::OK)
}

/// `GET /node/login`, answering the token as plain text
pub async fn login(
    State(state): AppState,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let token = state.auth.login(&query, now()).await?;
    Ok((
        [(WEB_SERVER, state.config.auth.web_server.clone())],
        token,
    )
        .into_response())
}

/// `POST /sign/verify`, answered in the envelope either way
pub async fn sign_verify(State(state): AppState, body: Bytes) -> Json<ApiResult<&'static str>> {
    let request: SignVerifyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return Json(ApiResult::err(e.to_string())),
    };
    match state.auth.sign_verify(&request).await {
        Ok(()) => Json(ApiResult::ok("success")),
        Err(e) => Json(ApiResult::err(e.to_string())),
    }
}

/// `GET /update/lua`: agent heartbeat plus script lookup
pub async fn update_lua(
    State(state): AppState,
    ClientIp(ip): ClientIp,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let device = DeviceReport::from_query(&params);
    let os = device.os.clone();
    let uuid = device.uuid.clone();
    let ip = ip.map(|ip| ip.to_string()).unwrap_or_default();
    state.registry.update_agent(device, &ip, now());

    let script = state
        .distribution
        .engine()
        .select_lua_script(&os, &uuid)
        .ok_or_else(|| ApiError::BadRequest(format!("no script for os {:?}", os)))?;
    Ok(Json(script.clone()).into_response())
}

/// `GET /config/controller`
pub async fn controller_config(
    State(state): AppState,
    Query(query): Query<ControllerQuery>,
) -> Result<Response, ApiError> {
    let file = state
        .distribution
        .controller_for(&query)
        .await
        .ok_or_else(|| ApiError::BadRequest(format!("no controller for os {:?}", query.os)))?;
    info!("Controller {} for {} ({})", file.name, query.uuid, query.os);
    Ok(Json(file).into_response())
}
