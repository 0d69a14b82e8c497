//! Signature checks against registered node keys

use fleet_core::NodeRegistration;
use k256::ecdsa::signature::Verifier;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::Sha256;

use super::AuthError;

/// Checks that a registered node produced a signature
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        registration: &NodeRegistration,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), AuthError>;
}

/// Verifies with whichever key a node registered.
///
/// A secp256k1 key takes precedence over an RSA one.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyVerifier;

impl SignatureVerifier for KeyVerifier {
    fn verify(
        &self,
        registration: &NodeRegistration,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), AuthError> {
        if !registration.secp256k1_public_key.is_empty() {
            return verify_secp256k1(&registration.secp256k1_public_key, message, signature);
        }
        if !registration.public_key.is_empty() {
            return verify_rsa(&registration.public_key, message, signature);
        }
        Err(AuthError::InvalidKey("no public key registered".into()))
    }
}

/// Parse an RSA public key in PKCS#1 or SPKI PEM form
pub fn parse_rsa_pem(pem: &str) -> Result<RsaPublicKey, AuthError> {
    RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|e| AuthError::InvalidKey(e.to_string()))
}

/// PKCS#1 v1.5 over SHA-256
fn verify_rsa(pem: &str, message: &[u8], signature: &[u8]) -> Result<(), AuthError> {
    let key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(parse_rsa_pem(pem)?);
    let signature = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| AuthError::BadSignature(e.to_string()))?;
    rsa::signature::Verifier::verify(&key, message, &signature)
        .map_err(|e| AuthError::BadSignature(e.to_string()))
}

/// ECDSA over SHA-256 with a hex SEC1 key and a 64-byte `r || s` signature
fn verify_secp256k1(key_hex: &str, message: &[u8], signature: &[u8]) -> Result<(), AuthError> {
    let key_bytes = hex::decode(key_hex).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
    let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
    let signature = k256::ecdsa::Signature::from_slice(signature)
        .map_err(|e| AuthError::BadSignature(e.to_string()))?;
    key.verify(message, &signature)
        .map_err(|e| AuthError::BadSignature(e.to_string()))
}
