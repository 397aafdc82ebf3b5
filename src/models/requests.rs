//! Request DTOs for the ops API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::invalidation::ChangeKind;

const MAX_KEY_LEN: usize = 256;

fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LEN {
        return Some(format!(
            "Key exceeds maximum length of {MAX_KEY_LEN} characters"
        ));
    }
    None
}

/// Request body for POST /events/entity
#[derive(Debug, Clone, Deserialize)]
pub struct EntityChangeRequest {
    /// Key of the catalog entity that changed
    pub key: String,
    pub kind: ChangeKind,
}

impl EntityChangeRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }
}

/// Request body for POST /events/manual
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualInvalidationRequest {
    #[serde(default)]
    pub key: Option<String>,
}

impl ManualInvalidationRequest {
    pub fn validate(&self) -> Option<String> {
        self.key.as_deref().and_then(validate_key)
    }
}

/// Request body for PUT /invalidation/auto
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AutoInvalidationRequest {
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_change_deserialize() {
        let json = r#"{"key": "node:42", "kind": "updated"}"#;
        let req: EntityChangeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "node:42");
        assert_eq!(req.kind, ChangeKind::Updated);
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_entity_change_rejects_unknown_kind() {
        let json = r#"{"key": "node:42", "kind": "renamed"}"#;
        assert!(serde_json::from_str::<EntityChangeRequest>(json).is_err());
    }

    #[test]
    fn test_validate_empty_key() {
        let req = EntityChangeRequest {
            key: String::new(),
            kind: ChangeKind::Added,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_manual_request_key_optional() {
        let req: ManualInvalidationRequest = serde_json::from_str("{}").unwrap();
        assert!(req.key.is_none());
        assert!(req.validate().is_none());

        let long = ManualInvalidationRequest {
            key: Some("k".repeat(300)),
        };
        assert!(long.validate().is_some());
    }
}
