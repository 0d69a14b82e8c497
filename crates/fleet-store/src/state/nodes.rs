//! Node records and the node activity index.

use chrono::{DateTime, Utc};
use fleet_core::{time, Node, NodeId};
use tracing::{debug, warn};

use super::{StateStore, INDEX_MAX_SCORE};
use crate::backend::Command;
use crate::codec;
use crate::error::StoreError;

impl StateStore {
    /// Write a node and refresh its activity index entry in one batch.
    ///
    /// When the node carries a serial number the serial binding is written
    /// in the same batch.
    pub async fn set_node(&self, node: &Node) -> Result<(), StoreError> {
        if node.id.is_empty() {
            return Err(StoreError::InvalidArgument("node id is empty".into()));
        }

        let mut batch = Vec::with_capacity(3);
        if !node.android_serial_number.is_empty() {
            batch.push(Command::Set {
                key: self.keys.serial_node(&node.android_serial_number),
                value: node.id.to_string(),
            });
        }
        batch.push(Command::HSet {
            key: self.keys.node(&node.id),
            fields: codec::node_fields(node),
        });
        batch.push(Command::ZAdd {
            key: self.keys.node_last_active(),
            score: time::unix_secs(node.last_activity_time) as f64,
            member: node.id.to_string(),
        });

        self.run("set_node", batch).await?;
        debug!(node = %node.id, "stored node");
        Ok(())
    }

    /// Read a node; `NotFound` when it was never written.
    pub async fn get_node(&self, id: &NodeId) -> Result<Node, StoreError> {
        let key = self.keys.node(id);
        if id.is_empty() {
            return Err(StoreError::not_found(key));
        }
        let map = self
            .run_one("get_node", Command::HGetAll { key: key.clone() })
            .await?
            .into_hash()?;
        codec::node_from_fields(&key, &map)?.ok_or_else(|| StoreError::not_found(key))
    }

    /// Read a node, or a zero-value node keyed by `id` when it was never written.
    pub async fn get_node_or_default(&self, id: &NodeId) -> Result<Node, StoreError> {
        match self.get_node(id).await {
            Ok(node) => Ok(node),
            Err(e) if e.is_not_found() => Ok(Node::new(id.clone())),
            Err(e) => Err(e),
        }
    }

    /// Read many nodes in one round trip, skipping the absent ones.
    ///
    /// A record that fails to decode is logged and skipped.
    pub async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<Node>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.keys.node(id)).collect();
        let batch = keys
            .iter()
            .map(|key| Command::HGetAll { key: key.clone() })
            .collect();
        let replies = self.run("get_nodes", batch).await?;

        let mut nodes = Vec::with_capacity(ids.len());
        for (key, reply) in keys.iter().zip(replies) {
            match codec::node_from_fields(key, &reply.into_hash()?) {
                Ok(Some(node)) => nodes.push(node),
                Ok(None) => {}
                Err(e) => warn!("get_nodes: skipping {}: {}", key, e),
            }
        }
        Ok(nodes)
    }

    /// Candidate node ids from the activity index with activity at or after `since`.
    ///
    /// Entries written as `app@node` by older writers map to their node.
    /// The index may hold stale scores; see [`StateStore::active_nodes_since`].
    pub async fn nodes_active_since(&self, since: DateTime<Utc>) -> Result<Vec<NodeId>, StoreError> {
        let members = self
            .run_one(
                "nodes_active_since",
                Command::ZRangeByScore {
                    key: self.keys.node_last_active(),
                    min: since.timestamp() as f64,
                    max: INDEX_MAX_SCORE,
                },
            )
            .await?
            .into_list()?;

        Ok(members
            .into_iter()
            .map(|member| match member.split_once('@') {
                Some((_, node)) => NodeId::new(node),
                None => NodeId::new(member),
            })
            .collect())
    }

    /// Nodes whose own `lastActivityTime` is at or after `since`.
    pub async fn active_nodes_since(&self, since: DateTime<Utc>) -> Result<Vec<Node>, StoreError> {
        let candidates = self.nodes_active_since(since).await?;
        let nodes = self.get_nodes(&candidates).await?;
        Ok(nodes
            .into_iter()
            .filter(|node| node.last_activity_time.is_some_and(|t| t >= since))
            .collect())
    }

    /// The node bound to a serial number.
    pub async fn node_id_by_serial(&self, serial: &str) -> Result<NodeId, StoreError> {
        let key = self.keys.serial_node(serial);
        self.run_one("node_id_by_serial", Command::Get { key: key.clone() })
            .await?
            .into_text()?
            .filter(|id| !id.is_empty())
            .map(NodeId::new)
            .ok_or_else(|| StoreError::not_found(key))
    }
}
