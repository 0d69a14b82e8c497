//! HS256 bearer tokens
//!
//! Tokens are compact JWTs: base64url header, base64url JSON claims and an
//! HMAC-SHA256 tag over the first two parts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Length of a generated secret in bytes
const SECRET_BYTES: usize = 32;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// What a token asserts about its bearer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub node_id: String,
    /// Issue time in unix seconds
    #[serde(default)]
    pub iat: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Issues and checks node tokens with one shared secret
pub struct TokenAuthority {
    secret: Vec<u8>,
}

impl TokenAuthority {
    /// Use `secret`, or a random one when it is empty.
    ///
    /// A random secret invalidates every token on restart.
    pub fn new(secret: &str) -> Self {
        if secret.is_empty() {
            tracing::warn!("No token secret configured, generating one for this process");
            let mut bytes = [0u8; SECRET_BYTES];
            rand::thread_rng().fill(&mut bytes);
            return Self {
                secret: bytes.to_vec(),
            };
        }
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidToken("bad secret"))
    }

    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let payload =
            serde_json::to_vec(claims).map_err(|_| AuthError::InvalidToken("unencodable claims"))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Check the tag and return the claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let token = token.trim();
        let (signing_input, tag) = token
            .rsplit_once('.')
            .ok_or(AuthError::InvalidToken("expected three parts"))?;
        let (header, payload) = signing_input
            .split_once('.')
            .filter(|(_, payload)| !payload.contains('.'))
            .ok_or(AuthError::InvalidToken("expected three parts"))?;

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(AuthError::InvalidToken("unsupported algorithm"));
        }

        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::InvalidToken("bad signature encoding"))?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::InvalidToken("signature mismatch"))?;

        let claims: TokenClaims = decode_json(payload)?;
        if claims.node_id.is_empty() {
            return Err(AuthError::InvalidToken("no node id"));
        }
        Ok(claims)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(part: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| AuthError::InvalidToken("bad base64"))?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken("bad json"))
}
