//! Catalog projections, per-node app records and the app activity index.

use chrono::{DateTime, Utc};
use fleet_core::{App, NodeApp, NodeId};
use tracing::warn;

use super::{StateStore, INDEX_MAX_SCORE, NODE_APP_TTL};
use crate::backend::Command;
use crate::codec;
use crate::error::StoreError;
use crate::keys::KeySpace;

/// Restricts [`StateStore::get_nodes_apps`] to one node and/or one app.
#[derive(Debug, Clone, Default)]
pub struct NodeAppFilter {
    pub node_id: Option<NodeId>,
    pub app_name: Option<String>,
}

impl NodeAppFilter {
    fn accepts(&self, node: &NodeId, app: &str) -> bool {
        self.node_id.as_ref().map_or(true, |n| n == node)
            && self.app_name.as_deref().map_or(true, |a| a == app)
    }
}

impl StateStore {
    /// Store one catalog projection.
    pub async fn set_app(&self, app: &App) -> Result<(), StoreError> {
        self.set_apps(std::slice::from_ref(app)).await
    }

    /// Store catalog projections in one batch.
    pub async fn set_apps(&self, apps: &[App]) -> Result<(), StoreError> {
        if apps.is_empty() {
            return Ok(());
        }
        let batch = apps
            .iter()
            .map(|app| Command::HSet {
                key: self.keys.app(&app.app_name),
                fields: codec::app_fields(app),
            })
            .collect();
        self.run("set_apps", batch).await?;
        Ok(())
    }

    /// Read one catalog projection.
    pub async fn get_app(&self, name: &str) -> Result<App, StoreError> {
        let key = self.keys.app(name);
        let map = self
            .run_one("get_app", Command::HGetAll { key: key.clone() })
            .await?
            .into_hash()?;
        codec::app_from_fields(&map).ok_or_else(|| StoreError::not_found(key))
    }

    /// Read many catalog projections, skipping absent ones.
    pub async fn get_apps(&self, names: &[String]) -> Result<Vec<App>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let batch = names
            .iter()
            .map(|name| Command::HGetAll {
                key: self.keys.app(name),
            })
            .collect();
        let replies = self.run("get_apps", batch).await?;
        let mut apps = Vec::with_capacity(names.len());
        for reply in replies {
            if let Some(app) = codec::app_from_fields(&reply.into_hash()?) {
                apps.push(app);
            }
        }
        Ok(apps)
    }

    /// Overwrite the records of the reported apps and refresh their index
    /// entries in one batch. Each record's activity time is set to `now`
    /// and it expires after [`NODE_APP_TTL`] without a new report.
    pub async fn set_node_apps(
        &self,
        id: &NodeId,
        apps: &[NodeApp],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("node id is empty".into()));
        }
        if apps.is_empty() {
            return Ok(());
        }

        let mut batch = Vec::with_capacity(apps.len() * 4);
        for app in apps {
            let key = self.keys.node_app(id, &app.app_name);
            let record = NodeApp {
                last_activity_time: Some(now),
                ..app.clone()
            };
            // Delete first so a record is replaced, never merged field by field.
            batch.push(Command::Del {
                keys: vec![key.clone()],
            });
            batch.push(Command::HSet {
                key: key.clone(),
                fields: codec::node_app_fields(&record),
            });
            batch.push(Command::Expire {
                key,
                ttl: NODE_APP_TTL,
            });
            batch.push(Command::ZAdd {
                key: self.keys.app_node_last_active(),
                score: now.timestamp() as f64,
                member: KeySpace::app_node_member(&app.app_name, id),
            });
        }
        self.run("set_node_apps", batch).await?;
        Ok(())
    }

    /// Read one per-node app record.
    pub async fn get_node_app(&self, id: &NodeId, app: &str) -> Result<NodeApp, StoreError> {
        let key = self.keys.node_app(id, app);
        let map = self
            .run_one("get_node_app", Command::HGetAll { key: key.clone() })
            .await?
            .into_hash()?;
        codec::node_app_from_fields(&key, &map)?.ok_or_else(|| StoreError::not_found(key))
    }

    /// Read the records of `apps` on one node, skipping absent or expired ones.
    pub async fn get_node_apps(&self, id: &NodeId, apps: &[String]) -> Result<Vec<NodeApp>, StoreError> {
        let pairs: Vec<(NodeId, String)> = apps.iter().map(|a| (id.clone(), a.clone())).collect();
        Ok(self
            .get_nodes_apps(&pairs, &NodeAppFilter::default())
            .await?
            .into_iter()
            .map(|(_, app)| app)
            .collect())
    }

    /// `(node, app)` pairs from the app activity index with activity at or after `since`.
    pub async fn node_apps_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(NodeId, String)>, StoreError> {
        let members = self
            .run_one(
                "node_apps_active_since",
                Command::ZRangeByScore {
                    key: self.keys.app_node_last_active(),
                    min: since.timestamp() as f64,
                    max: INDEX_MAX_SCORE,
                },
            )
            .await?
            .into_list()?;

        Ok(members
            .iter()
            .filter_map(|member| {
                let split = KeySpace::split_app_node_member(member);
                if split.is_none() {
                    warn!("node_apps_active_since: malformed member {:?}", member);
                }
                split.map(|(app, node)| (node, app.to_string()))
            })
            .collect())
    }

    /// Read the records for many `(node, app)` pairs in one round trip.
    ///
    /// Pairs rejected by `filter` are not read; absent records are skipped
    /// and undecodable ones are logged and skipped.
    pub async fn get_nodes_apps(
        &self,
        pairs: &[(NodeId, String)],
        filter: &NodeAppFilter,
    ) -> Result<Vec<(NodeId, NodeApp)>, StoreError> {
        let wanted: Vec<&(NodeId, String)> = pairs
            .iter()
            .filter(|(node, app)| filter.accepts(node, app))
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = wanted
            .iter()
            .map(|(node, app)| self.keys.node_app(node, app))
            .collect();
        let batch = keys
            .iter()
            .map(|key| Command::HGetAll { key: key.clone() })
            .collect();
        let replies = self.run("get_nodes_apps", batch).await?;

        let mut records = Vec::with_capacity(wanted.len());
        for ((node, _), (key, reply)) in wanted.into_iter().zip(keys.iter().zip(replies)) {
            match codec::node_app_from_fields(key, &reply.into_hash()?) {
                Ok(Some(app)) => records.push((node.clone(), app)),
                Ok(None) => {}
                Err(e) => warn!("get_nodes_apps: skipping {}: {}", key, e),
            }
        }
        Ok(records)
    }

    /// Add names to the set of apps ever assigned to a node.
    pub async fn add_node_apps_to_list(&self, id: &NodeId, apps: &[String]) -> Result<(), StoreError> {
        if apps.is_empty() {
            return Ok(());
        }
        self.run(
            "add_node_apps_to_list",
            vec![Command::SAdd {
                key: self.keys.node_app_list(id),
                members: apps.to_vec(),
            }],
        )
        .await?;
        Ok(())
    }

    /// Every app name ever assigned to a node.
    pub async fn get_node_app_list(&self, id: &NodeId) -> Result<Vec<String>, StoreError> {
        self.run_one(
            "get_node_app_list",
            Command::SMembers {
                key: self.keys.node_app_list(id),
            },
        )
        .await?
        .into_list()
    }

    /// Drop apps from a node's list together with their records.
    pub async fn delete_node_apps(&self, id: &NodeId, apps: &[String]) -> Result<(), StoreError> {
        if apps.is_empty() {
            return Ok(());
        }
        let records = apps.iter().map(|app| self.keys.node_app(id, app)).collect();
        self.run(
            "delete_node_apps",
            vec![
                Command::SRem {
                    key: self.keys.node_app_list(id),
                    members: apps.to_vec(),
                },
                Command::Del { keys: records },
            ],
        )
        .await?;
        Ok(())
    }

    /// Records of every app on a node's list that is still live.
    pub async fn app_infos_by_node(&self, id: &NodeId) -> Result<Vec<NodeApp>, StoreError> {
        let names = self.get_node_app_list(id).await?;
        self.get_node_apps(id, &names).await
    }
}
