//! Operator handlers over the registry and the store

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use fleet_core::time::{from_unix_secs, now};
use fleet_core::{MetricPayload, Node, NodeApp, NodeId};
use fleet_store::NodeAppFilter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::error::ApiError;
use super::ApiResult;
use crate::business::{client_id_tag, split_client_ids};
use crate::registry::{AgentSession, ControllerSession};
use crate::state::ControlPlaneState;

type AppState = State<Arc<ControlPlaneState>>;

/// Reachability as shown to operators
const NODE_STATE_ONLINE: i32 = 1;
const NODE_STATE_OFFLINE: i32 = 2;

#[derive(Serialize)]
pub struct AgentList {
    total: usize,
    agents: Vec<AgentSession>,
}

#[derive(Serialize)]
pub struct ControllerList {
    total: usize,
    controllers: Vec<ControllerSession>,
}

/// `GET /agents`
pub async fn agents(State(state): AppState) -> Json<AgentList> {
    let agents = state.registry.get_agents();
    Json(AgentList {
        total: agents.len(),
        agents,
    })
}

/// `GET /controllers`
pub async fn controllers(State(state): AppState) -> Json<ControllerList> {
    let controllers = state.registry.get_controllers();
    Json(ControllerList {
        total: controllers.len(),
        controllers,
    })
}

/// A node with its reachability and online statistics
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeWebInfo {
    #[serde(flatten)]
    pub node: Node,
    pub state: i32,
    /// Accumulated online seconds
    pub online_duration: i64,
    /// Online seconds over seconds since registration
    pub online_rate: f64,
}

impl NodeWebInfo {
    fn new(
        node: Node,
        online_duration: i64,
        registered_at: Option<i64>,
        state: &ControlPlaneState,
        now: DateTime<Utc>,
    ) -> Self {
        let threshold = chrono::Duration::from_std(state.registry.offline_threshold())
            .unwrap_or_else(|_| chrono::Duration::minutes(7));
        let online = node
            .last_activity_time
            .map_or(false, |last| now - last <= threshold);
        let online_rate = match registered_at {
            Some(created) if now.timestamp() > created => {
                online_duration as f64 / (now.timestamp() - created) as f64
            }
            _ => 0.0,
        };
        Self {
            node,
            state: if online {
                NODE_STATE_ONLINE
            } else {
                NODE_STATE_OFFLINE
            },
            online_duration,
            online_rate,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SinceQuery {
    pub last_activity_time: i64,
}

fn since(secs: i64) -> DateTime<Utc> {
    from_unix_secs(secs).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// `GET /node/list`
pub async fn node_list(
    State(state): AppState,
    Query(query): Query<SinceQuery>,
) -> Result<Json<ApiResult<Vec<NodeWebInfo>>>, ApiError> {
    let store = &state.store;
    let nodes = store
        .active_nodes_since(since(query.last_activity_time))
        .await?;
    let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
    let (durations, registrations) = futures::join!(
        store.online_duration_map(&ids),
        store.registrations(&ids)
    );
    let durations = durations?;
    let registrations = registrations?;

    let now = now();
    let list = nodes
        .into_iter()
        .map(|node| {
            let duration = durations.get(&node.id).copied().unwrap_or_default();
            let created = registrations.get(&node.id).map(|r| r.created_time);
            NodeWebInfo::new(node, duration, created, &state, now)
        })
        .collect();
    Ok(Json(ApiResult::ok(list)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeInfoQuery {
    pub node_id: String,
    pub sn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node: NodeWebInfo,
    pub apps: Vec<NodeApp>,
    /// Online seconds per day stamp
    pub online_statistics: BTreeMap<String, i64>,
}

/// `GET /node/info`, by `node_id` or by serial number
pub async fn node_info(
    State(state): AppState,
    Query(query): Query<NodeInfoQuery>,
) -> Result<Json<ApiResult<NodeInfo>>, ApiError> {
    let store = &state.store;
    let id = match (query.node_id.is_empty(), query.sn.is_empty()) {
        (true, true) => {
            return Err(ApiError::BadRequest(
                "node_id or sn parameter required".into(),
            ))
        }
        (_, false) => store.node_id_by_serial(&query.sn).await?,
        (false, true) => NodeId::new(query.node_id),
    };

    let node = store.get_node(&id).await?;
    let apps = store.app_infos_by_node(&id).await?;
    let duration = store.online_duration(&id).await?;
    let created = match store.registration(&id).await {
        Ok(reg) => Some(reg.created_time),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };
    let online_statistics = store.online_duration_stats(&id).await.unwrap_or_else(|e| {
        error!("failed to read online statistics of {}: {}", id, e);
        BTreeMap::new()
    });

    Ok(Json(ApiResult::ok(NodeInfo {
        node: NodeWebInfo::new(node, duration, created, &state, now()),
        apps,
        online_statistics,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeAppsQuery {
    pub last_activity_time: i64,
    pub node_id: String,
    pub app_name: String,
    pub tag: String,
    pub client_id: String,
}

/// One client identity reported by one app on one node
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAppWebInfo {
    pub last_activity_time: Option<DateTime<Utc>>,
    pub node_id: NodeId,
    pub app_name: String,
    pub channel: String,
    pub tag: String,
    pub client_id: String,
}

/// `GET /node/apps`
pub async fn node_apps(
    State(state): AppState,
    Query(query): Query<NodeAppsQuery>,
) -> Result<Json<ApiResult<Vec<NodeAppWebInfo>>>, ApiError> {
    let store = &state.store;
    let pairs = store
        .node_apps_active_since(since(query.last_activity_time))
        .await?;
    let filter = NodeAppFilter {
        node_id: (!query.node_id.is_empty()).then(|| NodeId::new(query.node_id.as_str())),
        app_name: (!query.app_name.is_empty()).then(|| query.app_name.clone()),
    };
    let records = store.get_nodes_apps(&pairs, &filter).await?;

    let catalog = &state.catalog;
    let channels: HashMap<&str, &str> = catalog
        .channel_apps
        .iter()
        .flat_map(|(channel, apps)| apps.iter().map(move |app| (app.as_str(), channel.as_str())))
        .collect();

    let mut list = Vec::new();
    for (node_id, app) in records {
        let catalog_tag = catalog
            .app(&app.app_name)
            .map(|a| a.tag.clone())
            .unwrap_or_default();
        let client_id = if app.metric.is_empty() {
            String::new()
        } else {
            MetricPayload::parse_tagged(&catalog_tag, &app.metric)
                .map(|m| m.client_id().to_string())
                .unwrap_or_default()
        };
        let client_ids = if client_id.contains(';') {
            split_client_ids(&client_id)
        } else {
            vec![client_id]
        };

        for client_id in client_ids {
            let tag = if catalog_tag.is_empty() {
                client_id_tag(&client_id).unwrap_or_default().to_string()
            } else {
                catalog_tag.clone()
            };
            list.push(NodeAppWebInfo {
                last_activity_time: app.last_activity_time,
                node_id: node_id.clone(),
                app_name: app.app_name.clone(),
                channel: channels
                    .get(app.app_name.as_str())
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                tag,
                client_id,
            });
        }
    }

    list.retain(|info| {
        (query.tag.is_empty() || info.tag == query.tag)
            && (query.client_id.is_empty() || info.client_id == query.client_id)
    });
    Ok(Json(ApiResult::ok(list)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeQuery {
    pub node_id: String,
}

/// An operator's app choice for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAppConfig {
    #[serde(default)]
    pub node_id: String,
    pub app_name: String,
    #[serde(default)]
    pub tag: String,
}

fn required_node(query: NodeQuery) -> Result<NodeId, ApiError> {
    if query.node_id.is_empty() {
        return Err(ApiError::BadRequest("node_id is required".into()));
    }
    Ok(NodeId::new(query.node_id))
}

/// `GET /node/configs`: the specified apps, else every app ever assigned
pub async fn get_node_configs(
    State(state): AppState,
    Query(query): Query<NodeQuery>,
) -> Result<Json<ApiResult<Vec<NodeAppConfig>>>, ApiError> {
    let id = required_node(query)?;
    let mut names = state.store.specified_apps(&id).await?;
    if names.is_empty() {
        names = state.store.get_node_app_list(&id).await?;
    }

    let configs = names
        .iter()
        .filter_map(|name| state.catalog.app(name))
        .map(|app| NodeAppConfig {
            node_id: id.to_string(),
            app_name: app.app_name.clone(),
            tag: app.tag.clone(),
        })
        .collect();
    Ok(Json(ApiResult::ok(configs)))
}

/// Refuse a switch while a previously specified app has not come online.
async fn ensure_switchable(state: &ControlPlaneState, id: &NodeId) -> Result<(), ApiError> {
    let specified = state.store.specified_apps(id).await?;
    if specified.is_empty() {
        return Ok(());
    }
    state.store.get_node(id).await?;
    let records = state.store.app_infos_by_node(id).await?;
    let live: HashMap<&str, Option<DateTime<Utc>>> = records
        .iter()
        .map(|r| (r.app_name.as_str(), r.last_activity_time))
        .collect();

    let threshold = chrono::Duration::from_std(state.registry.offline_threshold())
        .unwrap_or_else(|_| chrono::Duration::minutes(7));
    let now = now();
    for name in &specified {
        match live.get(name.as_str()) {
            None => {
                return Err(ApiError::Unavailable(format!(
                    "switch apps is unavailable, app {} is in process",
                    name
                )))
            }
            Some(last) if last.map_or(true, |t| now - t > threshold) => {
                return Err(ApiError::Unavailable(format!(
                    "switch apps is unavailable, app {} is still offline",
                    name
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// `POST /node/configs`: replace the specified apps of a node
pub async fn set_node_configs(
    State(state): AppState,
    Query(query): Query<NodeQuery>,
    body: Bytes,
) -> Result<Json<ApiResult<&'static str>>, ApiError> {
    let id = required_node(query)?;
    ensure_switchable(&state, &id).await?;

    let requested: Vec<NodeAppConfig> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mut seen = HashSet::new();
    let apps: Vec<String> = requested
        .iter()
        .filter(|r| {
            state
                .catalog
                .app(&r.app_name)
                .map_or(false, |app| app.tag == r.tag)
        })
        .filter(|r| seen.insert(r.app_name.clone()))
        .map(|r| r.app_name.clone())
        .collect();

    state.store.set_specified_apps(&id, &apps).await?;
    info!("Specified apps of {} set to {:?}", id, apps);
    Ok(Json(ApiResult::ok("success")))
}

/// `GET /health`
pub async fn health(State(state): AppState) -> StatusCode {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!("health check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
