//! Operator overrides: app layers and the pinned controller binary.

use fleet_core::config::FileConfig;
use fleet_core::{NodeId, OverrideLayers};

use super::StateStore;
use crate::backend::Command;
use crate::error::StoreError;

impl StateStore {
    /// Apps that replace the computed set for a node.
    pub async fn specified_apps(&self, id: &NodeId) -> Result<Vec<String>, StoreError> {
        self.members("specified_apps", self.keys.specified_apps(id)).await
    }

    /// Apps appended to whatever set a node receives.
    pub async fn extra_apps(&self, id: &NodeId) -> Result<Vec<String>, StoreError> {
        self.members("extra_apps", self.keys.extra_apps(id)).await
    }

    /// Apps never handed to a node.
    pub async fn removed_apps(&self, id: &NodeId) -> Result<Vec<String>, StoreError> {
        self.members("removed_apps", self.keys.removed_apps(id)).await
    }

    /// Replace the specified layer; an empty list clears it.
    pub async fn set_specified_apps(&self, id: &NodeId, apps: &[String]) -> Result<(), StoreError> {
        self.replace_set("set_specified_apps", self.keys.specified_apps(id), apps)
            .await
    }

    /// Replace the extra layer; an empty list clears it.
    pub async fn set_extra_apps(&self, id: &NodeId, apps: &[String]) -> Result<(), StoreError> {
        self.replace_set("set_extra_apps", self.keys.extra_apps(id), apps)
            .await
    }

    /// Replace the removed layer; an empty list clears it.
    pub async fn set_removed_apps(&self, id: &NodeId, apps: &[String]) -> Result<(), StoreError> {
        self.replace_set("set_removed_apps", self.keys.removed_apps(id), apps)
            .await
    }

    /// All three layers in one round trip.
    pub async fn override_layers(&self, id: &NodeId) -> Result<OverrideLayers, StoreError> {
        let replies = self
            .run(
                "override_layers",
                vec![
                    Command::SMembers {
                        key: self.keys.specified_apps(id),
                    },
                    Command::SMembers {
                        key: self.keys.extra_apps(id),
                    },
                    Command::SMembers {
                        key: self.keys.removed_apps(id),
                    },
                ],
            )
            .await?;

        let mut lists = replies.into_iter().map(|r| r.into_list());
        let mut next = || lists.next().unwrap_or_else(|| Ok(Vec::new()));
        Ok(OverrideLayers {
            specified: next()?,
            extra: next()?,
            removed: next()?,
        })
    }

    /// Controller binary pinned to a node by an operator, if any.
    pub async fn specified_controller(&self, id: &NodeId) -> Result<Option<FileConfig>, StoreError> {
        let key = self.keys.specified_controller(id);
        let raw = self
            .run_one("specified_controller", Command::Get { key: key.clone() })
            .await?
            .into_text()?;
        match raw {
            None => Ok(None),
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::corrupt(key, e)),
        }
    }

    /// Pin a controller binary to a node, or unpin with `None`.
    pub async fn set_specified_controller(
        &self,
        id: &NodeId,
        file: Option<&FileConfig>,
    ) -> Result<(), StoreError> {
        let key = self.keys.specified_controller(id);
        let command = match file {
            Some(file) => Command::Set {
                key,
                value: serde_json::to_string(file)
                    .map_err(|e| StoreError::InvalidArgument(e.to_string()))?,
            },
            None => Command::Del { keys: vec![key] },
        };
        self.run("set_specified_controller", vec![command]).await?;
        Ok(())
    }

    async fn members(&self, op: &'static str, key: String) -> Result<Vec<String>, StoreError> {
        self.run_one(op, Command::SMembers { key }).await?.into_list()
    }

    async fn replace_set(&self, op: &'static str, key: String, members: &[String]) -> Result<(), StoreError> {
        let mut batch = vec![Command::Del {
            keys: vec![key.clone()],
        }];
        if !members.is_empty() {
            batch.push(Command::SAdd {
                key,
                members: members.to_vec(),
            });
        }
        self.run(op, batch).await?;
        Ok(())
    }
}
