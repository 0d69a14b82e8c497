//! Node authentication
//!
//! Nodes register a public key once, then log in by signing their own id
//! and receive a bearer token. Authenticated endpoints present that token;
//! blacklisted nodes are refused even with a valid one.

mod registration;
mod token;
mod verifier;

pub use token::{TokenAuthority, TokenClaims};
pub use verifier::{parse_rsa_pem, KeyVerifier, SignatureVerifier};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_core::NodeId;
use fleet_protocol::{LoginQuery, ProtocolError, SignVerifyRequest};
use fleet_store::{StateStore, StoreError};
use tracing::{info, warn};

/// Errors from registration, login and token checks
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(&'static str),

    #[error("node {0} is blacklisted")]
    Blacklisted(NodeId),

    #[error("node {0} is not registered")]
    NotRegistered(NodeId),

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("signature rejected: {0}")]
    BadSignature(String),

    #[error(transparent)]
    Invalid(#[from] ProtocolError),

    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },
}

impl AuthError {
    pub(crate) fn store(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| AuthError::Store { op, source }
    }
}

/// Registration, login and token checks against the store
pub struct Authenticator {
    store: StateStore,
    tokens: TokenAuthority,
    verifier: Arc<dyn SignatureVerifier>,
}

impl Authenticator {
    pub fn new(
        store: StateStore,
        tokens: TokenAuthority,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            store,
            tokens,
            verifier,
        }
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    /// Resolve a bearer token to the node it was issued to
    pub async fn authenticate(&self, token: Option<&str>) -> Result<NodeId, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let claims = self.tokens.verify(token)?;
        let id = NodeId::new(claims.node_id);

        let blacklisted = self
            .store
            .is_blacklisted(&id)
            .await
            .map_err(AuthError::store("is_blacklisted"))?;
        if blacklisted {
            warn!("Refusing blacklisted node {}", id);
            return Err(AuthError::Blacklisted(id));
        }
        Ok(id)
    }

    /// Exchange a signature over the node id for a token
    pub async fn login(&self, query: &LoginQuery, now: DateTime<Utc>) -> Result<String, AuthError> {
        query.validate()?;
        let id = NodeId::new(query.node_id.as_str());
        let signature = decode_signature(&query.sign)?;

        let registration = self.registration(&id).await?;
        self.verifier
            .verify(&registration, id.as_str().as_bytes(), &signature)?;

        let token = self.tokens.sign(&TokenClaims {
            node_id: id.to_string(),
            iat: now.timestamp(),
        })?;
        info!("Node {} logged in", id);
        Ok(token)
    }

    /// Check a signature over arbitrary content with a node's registered key
    pub async fn sign_verify(&self, request: &SignVerifyRequest) -> Result<(), AuthError> {
        if request.node_id.is_empty() {
            return Err(ProtocolError::MissingField("nodeId").into());
        }
        if request.sign.is_empty() {
            return Err(ProtocolError::MissingField("sign").into());
        }
        if request.content.is_empty() {
            return Err(ProtocolError::MissingField("content").into());
        }
        let signature = decode_signature(&request.sign)?;
        let registration = self
            .registration(&NodeId::new(request.node_id.as_str()))
            .await?;
        self.verifier
            .verify(&registration, request.content.as_bytes(), &signature)
    }

    async fn registration(
        &self,
        id: &NodeId,
    ) -> Result<fleet_core::NodeRegistration, AuthError> {
        match self.store.registration(id).await {
            Ok(reg) => Ok(reg),
            Err(e) if e.is_not_found() => Err(AuthError::NotRegistered(id.clone())),
            Err(e) => Err(AuthError::Store {
                op: "registration",
                source: e,
            }),
        }
    }
}

fn decode_signature(sign: &str) -> Result<Vec<u8>, AuthError> {
    hex::decode(sign.trim()).map_err(|e| {
        AuthError::Invalid(ProtocolError::InvalidValue {
            field: "sign",
            reason: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k256::ecdsa::signature::Signer;
    use k256::ecdsa::{Signature, SigningKey};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn authenticator(store: &StateStore) -> Authenticator {
        Authenticator::new(
            store.clone(),
            TokenAuthority::new("secret"),
            Arc::new(KeyVerifier),
        )
    }

    async fn registered(auth: &Authenticator, id: &str) -> SigningKey {
        let key = SigningKey::random(&mut rand::thread_rng());
        let public = key.verifying_key().to_encoded_point(true);
        auth.register_secp256k1(id, public.as_bytes(), now())
            .await
            .unwrap();
        key
    }

    fn sign(key: &SigningKey, message: &str) -> String {
        let signature: Signature = key.sign(message.as_bytes());
        hex::encode(signature.to_bytes())
    }

    #[tokio::test]
    async fn test_login_then_authenticate() {
        let store = StateStore::in_memory();
        let auth = authenticator(&store);
        let key = registered(&auth, "n1").await;

        let token = auth
            .login(
                &LoginQuery {
                    node_id: "n1".into(),
                    sign: sign(&key, "n1"),
                },
                now(),
            )
            .await
            .unwrap();
        assert_eq!(
            auth.authenticate(Some(&token)).await.unwrap(),
            NodeId::new("n1")
        );
    }

    #[tokio::test]
    async fn test_login_failures() {
        let store = StateStore::in_memory();
        let auth = authenticator(&store);
        let key = registered(&auth, "n1").await;

        let wrong_message = LoginQuery {
            node_id: "n1".into(),
            sign: sign(&key, "n2"),
        };
        assert!(matches!(
            auth.login(&wrong_message, now()).await,
            Err(AuthError::BadSignature(_))
        ));

        let unknown = LoginQuery {
            node_id: "n9".into(),
            sign: sign(&key, "n9"),
        };
        assert!(matches!(
            auth.login(&unknown, now()).await,
            Err(AuthError::NotRegistered(_))
        ));

        let not_hex = LoginQuery {
            node_id: "n1".into(),
            sign: "zz".into(),
        };
        assert!(matches!(
            auth.login(&not_hex, now()).await,
            Err(AuthError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_missing_and_blacklisted() {
        let store = StateStore::in_memory();
        let auth = authenticator(&store);
        assert!(matches!(
            auth.authenticate(None).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(Some("  ")).await,
            Err(AuthError::MissingToken)
        ));

        let token = auth
            .tokens()
            .sign(&TokenClaims {
                node_id: "n1".into(),
                iat: 0,
            })
            .unwrap();
        store.blacklist_node(&NodeId::new("n1")).await.unwrap();
        assert!(matches!(
            auth.authenticate(Some(&token)).await,
            Err(AuthError::Blacklisted(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_verify() {
        let store = StateStore::in_memory();
        let auth = authenticator(&store);
        let key = registered(&auth, "n1").await;

        let request = SignVerifyRequest {
            node_id: "n1".into(),
            sign: sign(&key, "hello"),
            content: "hello".into(),
        };
        assert!(auth.sign_verify(&request).await.is_ok());

        let tampered = SignVerifyRequest {
            content: "bye".into(),
            ..request.clone()
        };
        assert!(auth.sign_verify(&tampered).await.is_err());

        let empty = SignVerifyRequest {
            content: String::new(),
            ..request
        };
        assert!(matches!(
            auth.sign_verify(&empty).await,
            Err(AuthError::Invalid(_))
        ));
    }
}
