//! Public key registration

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use fleet_core::{NodeId, NodeRegistration};
use fleet_protocol::{ProtocolError, RegisterQuery};
use tracing::info;

use super::{parse_rsa_pem, AuthError, Authenticator};

/// Length of a compressed secp256k1 public key
pub const SECP256K1_KEY_LEN: usize = 33;

/// Decode a base64url public key, padded or not
fn decode_pub_key(encoded: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|e| {
            AuthError::Invalid(ProtocolError::InvalidValue {
                field: "pub_key",
                reason: e.to_string(),
            })
        })
}

enum KeyKind<'a> {
    Rsa(&'a str),
    Secp256k1(&'a str),
}

impl Authenticator {
    /// Register from the `node_id` / base64url PEM query
    pub async fn register(&self, query: &RegisterQuery, now: DateTime<Utc>) -> Result<(), AuthError> {
        query.validate()?;
        let pem_bytes = decode_pub_key(&query.pub_key)?;
        let pem = String::from_utf8(pem_bytes).map_err(|_| {
            AuthError::InvalidKey("public key is not utf-8 PEM".into())
        })?;
        self.register_rsa(&query.node_id, &pem, now).await
    }

    /// Register from the `node_id` / base64url secp256k1 key query
    pub async fn register_wallet(
        &self,
        query: &RegisterQuery,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        query.validate()?;
        let key = decode_pub_key(&query.pub_key)?;
        self.register_secp256k1(&query.node_id, &key, now).await
    }

    /// Store an RSA PEM key for a node.
    ///
    /// Re-registering the same key is a no-op; a different key replaces the
    /// old one and keeps the original creation time.
    pub async fn register_rsa(
        &self,
        node_id: &str,
        pem: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        parse_rsa_pem(pem)?;
        self.store_key(node_id, KeyKind::Rsa(pem), now).await
    }

    /// Store a compressed secp256k1 key for a node, hex encoded
    pub async fn register_secp256k1(
        &self,
        node_id: &str,
        key: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if key.len() != SECP256K1_KEY_LEN {
            return Err(AuthError::InvalidKey(format!(
                "expected {} bytes, got {}",
                SECP256K1_KEY_LEN,
                key.len()
            )));
        }
        let key_hex = hex::encode(key);
        self.store_key(node_id, KeyKind::Secp256k1(&key_hex), now)
            .await
    }

    async fn store_key(
        &self,
        node_id: &str,
        key: KeyKind<'_>,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if node_id.is_empty() {
            return Err(ProtocolError::MissingField("node_id").into());
        }
        let id = NodeId::new(node_id);

        match self.store.registration(&id).await {
            Ok(existing) => {
                let (rsa, secp) = match key {
                    KeyKind::Rsa(pem) if existing.public_key != pem => (Some(pem), None),
                    KeyKind::Secp256k1(hex) if existing.secp256k1_public_key != hex => {
                        (None, Some(hex))
                    }
                    _ => return Ok(()),
                };
                self.store
                    .update_registration_key(&id, rsa, secp)
                    .await
                    .map_err(AuthError::store("update_registration_key"))?;
                info!("Node {} rotated its public key", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let mut reg = NodeRegistration {
                    node_id: id.clone(),
                    created_time: now.timestamp(),
                    ..Default::default()
                };
                match key {
                    KeyKind::Rsa(pem) => reg.public_key = pem.to_string(),
                    KeyKind::Secp256k1(hex) => reg.secp256k1_public_key = hex.to_string(),
                }
                self.store
                    .register_node(&reg)
                    .await
                    .map_err(AuthError::store("register_node"))?;
                info!("Node {} registered", id);
                Ok(())
            }
            Err(e) => Err(AuthError::Store {
                op: "registration",
                source: e,
            }),
        }
    }
}
