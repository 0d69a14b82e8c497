//! Registration and login parameters

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// `node_id` plus a base64 encoded public key
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterQuery {
    pub node_id: String,
    pub pub_key: String,
}

impl RegisterQuery {
    /// Reject requests missing either parameter.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.node_id.is_empty() {
            return Err(ProtocolError::MissingField("node_id"));
        }
        if self.pub_key.is_empty() {
            return Err(ProtocolError::MissingField("pub_key"));
        }
        Ok(())
    }
}

/// `node_id` plus a hex signature over the node id
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginQuery {
    pub node_id: String,
    pub sign: String,
}

impl LoginQuery {
    /// Reject requests missing either parameter.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.node_id.is_empty() {
            return Err(ProtocolError::MissingField("node_id"));
        }
        if self.sign.is_empty() {
            return Err(ProtocolError::MissingField("sign"));
        }
        Ok(())
    }
}

/// Ask the control plane to check a signature made with a node's registered key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignVerifyRequest {
    pub node_id: String,
    /// Hex encoded signature
    pub sign: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_query_requires_both_fields() {
        let query = RegisterQuery {
            node_id: "n1".into(),
            pub_key: String::new(),
        };
        assert!(matches!(
            query.validate(),
            Err(ProtocolError::MissingField("pub_key"))
        ));
    }

    #[test]
    fn test_login_query_valid() {
        let query = LoginQuery {
            node_id: "n1".into(),
            sign: "abcd".into(),
        };
        assert!(query.validate().is_ok());
    }
}
