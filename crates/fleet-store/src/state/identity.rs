//! Registrations, the blacklist and the serial whitelist.

use std::collections::HashMap;

use fleet_core::{NodeId, NodeRegistration};
use tracing::warn;

use super::StateStore;
use crate::backend::Command;
use crate::error::StoreError;

impl StateStore {
    /// The registration of one node; `NotFound` when it never registered.
    pub async fn registration(&self, id: &NodeId) -> Result<NodeRegistration, StoreError> {
        let key = self.keys.registrations();
        let raw = self
            .run_one(
                "registration",
                Command::HGet {
                    key: key.clone(),
                    field: id.to_string(),
                },
            )
            .await?
            .into_text()?;
        match raw {
            None => Err(StoreError::not_found(format!("{}/{}", key, id))),
            Some(text) => serde_json::from_str(&text).map_err(|e| StoreError::corrupt(key, e)),
        }
    }

    /// Registrations of many nodes in one round trip, skipping absent ones.
    pub async fn registrations(
        &self,
        ids: &[NodeId],
    ) -> Result<HashMap<NodeId, NodeRegistration>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let key = self.keys.registrations();
        let batch = ids
            .iter()
            .map(|id| Command::HGet {
                key: key.clone(),
                field: id.to_string(),
            })
            .collect();
        let replies = self.run("registrations", batch).await?;

        let mut found = HashMap::new();
        for (id, reply) in ids.iter().zip(replies) {
            let Some(text) = reply.into_text()? else {
                continue;
            };
            match serde_json::from_str::<NodeRegistration>(&text) {
                Ok(reg) => {
                    found.insert(id.clone(), reg);
                }
                Err(e) => warn!("registrations: skipping {}: {}", id, e),
            }
        }
        Ok(found)
    }

    /// Store a registration under its node id, replacing any previous one.
    pub async fn register_node(&self, reg: &NodeRegistration) -> Result<(), StoreError> {
        if reg.node_id.is_empty() {
            return Err(StoreError::InvalidArgument("node id is empty".into()));
        }
        let value =
            serde_json::to_string(reg).map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        self.run(
            "register_node",
            vec![Command::HSet {
                key: self.keys.registrations(),
                fields: vec![(reg.node_id.to_string(), value)],
            }],
        )
        .await?;
        Ok(())
    }

    /// Replace the key of an existing registration, keeping its creation time.
    ///
    /// Only the key kind being rotated is touched; pass the other as `None`.
    pub async fn update_registration_key(
        &self,
        id: &NodeId,
        public_key: Option<&str>,
        secp256k1_public_key: Option<&str>,
    ) -> Result<NodeRegistration, StoreError> {
        let mut reg = self.registration(id).await?;
        if let Some(pem) = public_key {
            reg.public_key = pem.to_string();
        }
        if let Some(hex) = secp256k1_public_key {
            reg.secp256k1_public_key = hex.to_string();
        }
        self.register_node(&reg).await?;
        Ok(reg)
    }

    pub async fn is_blacklisted(&self, id: &NodeId) -> Result<bool, StoreError> {
        self.run_one(
            "is_blacklisted",
            Command::SIsMember {
                key: self.keys.blacklist(),
                member: id.to_string(),
            },
        )
        .await?
        .into_bool()
    }

    pub async fn blacklist_node(&self, id: &NodeId) -> Result<(), StoreError> {
        self.run(
            "blacklist_node",
            vec![Command::SAdd {
                key: self.keys.blacklist(),
                members: vec![id.to_string()],
            }],
        )
        .await?;
        Ok(())
    }

    pub async fn unblacklist_node(&self, id: &NodeId) -> Result<(), StoreError> {
        self.run(
            "unblacklist_node",
            vec![Command::SRem {
                key: self.keys.blacklist(),
                members: vec![id.to_string()],
            }],
        )
        .await?;
        Ok(())
    }

    /// Whether a box serial number may join the fleet.
    pub async fn is_serial_whitelisted(&self, serial: &str) -> Result<bool, StoreError> {
        self.run_one(
            "is_serial_whitelisted",
            Command::SIsMember {
                key: self.keys.serial_whitelist(),
                member: serial.to_string(),
            },
        )
        .await?
        .into_bool()
    }

    /// Whether every serial in `serials` is whitelisted, in one round trip.
    pub async fn serials_whitelisted(&self, serials: &[String]) -> Result<bool, StoreError> {
        if serials.is_empty() {
            return Ok(false);
        }
        let key = self.keys.serial_whitelist();
        let batch = serials
            .iter()
            .map(|serial| Command::SIsMember {
                key: key.clone(),
                member: serial.clone(),
            })
            .collect();
        for reply in self.run("serials_whitelisted", batch).await? {
            if !reply.into_bool()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn add_whitelisted_serials(&self, serials: &[String]) -> Result<(), StoreError> {
        if serials.is_empty() {
            return Ok(());
        }
        self.run(
            "add_whitelisted_serials",
            vec![Command::SAdd {
                key: self.keys.serial_whitelist(),
                members: serials.to_vec(),
            }],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(id: &str, secp: &str) -> NodeRegistration {
        NodeRegistration {
            node_id: NodeId::new(id),
            public_key: String::new(),
            secp256k1_public_key: secp.into(),
            created_time: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_registration_roundtrip() {
        let store = StateStore::in_memory();
        let r = reg("n1", "02ab");
        store.register_node(&r).await.unwrap();

        assert_eq!(store.registration(&NodeId::new("n1")).await.unwrap(), r);
        assert!(store
            .registration(&NodeId::new("n2"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_registrations_batch() {
        let store = StateStore::in_memory();
        store.register_node(&reg("a", "01")).await.unwrap();
        store.register_node(&reg("c", "03")).await.unwrap();

        let ids: Vec<NodeId> = ["a", "b", "c"].iter().map(|s| NodeId::new(*s)).collect();
        let found = store.registrations(&ids).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&NodeId::new("c")].secp256k1_public_key, "03");
    }

    #[tokio::test]
    async fn test_blacklist() {
        let store = StateStore::in_memory();
        let id = NodeId::new("bad");
        assert!(!store.is_blacklisted(&id).await.unwrap());

        store.blacklist_node(&id).await.unwrap();
        assert!(store.is_blacklisted(&id).await.unwrap());

        store.unblacklist_node(&id).await.unwrap();
        assert!(!store.is_blacklisted(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_serial_whitelist() {
        let store = StateStore::in_memory();
        store
            .add_whitelisted_serials(&["TT20240101ABCDEFGHIJ".to_string()])
            .await
            .unwrap();
        assert!(store
            .is_serial_whitelisted("TT20240101ABCDEFGHIJ")
            .await
            .unwrap());
        assert!(!store
            .is_serial_whitelisted("TT20240101ZZZZZZZZZZ")
            .await
            .unwrap());

        let both = vec![
            "TT20240101ABCDEFGHIJ".to_string(),
            "TT20240101ZZZZZZZZZZ".to_string(),
        ];
        assert!(!store.serials_whitelisted(&both).await.unwrap());
        assert!(store.serials_whitelisted(&both[..1]).await.unwrap());
    }

    #[tokio::test]
    async fn test_key_rotation_keeps_created_time() {
        let store = StateStore::in_memory();
        store.register_node(&reg("n1", "02aa")).await.unwrap();

        let rotated = store
            .update_registration_key(&NodeId::new("n1"), None, Some("03bb"))
            .await
            .unwrap();
        assert_eq!(rotated.secp256k1_public_key, "03bb");
        assert_eq!(rotated.created_time, 1_700_000_000);
        assert_eq!(store.registration(&NodeId::new("n1")).await.unwrap(), rotated);
        assert!(store
            .update_registration_key(&NodeId::new("ghost"), Some("pem"), None)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
