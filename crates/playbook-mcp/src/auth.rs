//! API-key authorization.
//!
//! Keys look like `pbk_<32 hex>`. The plaintext is shown once at issue time;
//! the store keeps only its blake3 hash.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use playbook_core::{Authorizer, Permission, PlaybookError, Principal, Result};
use playbook_store::{ApiKeyRow, Database};

const KEY_PREFIX: &str = "pbk_";

/// Hex blake3 digest of a bearer secret.
pub fn hash_key(secret: &str) -> String {
    blake3::hash(secret.as_bytes()).to_hex().to_string()
}

/// A freshly issued key. `secret` is never retrievable again.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedKey {
    pub secret: String,
    pub record: ApiKeyRow,
}

/// [`Authorizer`] backed by the `api_keys` table.
#[derive(Clone)]
pub struct ApiKeyAuthorizer {
    db: Database,
}

impl ApiKeyAuthorizer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a key bound to `playbook_id`. Scopes are validated; `"*"` grants all.
    pub fn issue(&self, playbook_id: &str, name: &str, permissions: &[String]) -> Result<IssuedKey> {
        for scope in permissions {
            if scope != "*" {
                scope.parse::<Permission>()?;
            }
        }
        if self.db.get_playbook(playbook_id)?.is_none() {
            return Err(PlaybookError::PlaybookNotFound(playbook_id.to_string()));
        }

        let secret = format!("{KEY_PREFIX}{}", uuid::Uuid::new_v4().simple());
        let record = self
            .db
            .insert_api_key(playbook_id, name, &hash_key(&secret), permissions, Utc::now())?;
        Ok(IssuedKey { secret, record })
    }
}

#[async_trait]
impl Authorizer for ApiKeyAuthorizer {
    async fn authorize(
        &self,
        credential: Option<&str>,
        playbook_id: &str,
        scope: Option<Permission>,
    ) -> Result<Principal> {
        let Some(secret) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            return Err(PlaybookError::PermissionDenied("an API key is required".into()));
        };

        let Some(row) = self.db.use_api_key(&hash_key(secret), Utc::now())? else {
            return Err(PlaybookError::PermissionDenied("invalid or revoked API key".into()));
        };
        if row.playbook_id != playbook_id {
            return Err(PlaybookError::PermissionDenied(
                "API key is not bound to this playbook".into(),
            ));
        }

        let principal = Principal::ApiKey {
            key_id: row.id,
            playbook_id: row.playbook_id,
            permissions: row.permissions,
        };
        if let Some(required) = scope
            && !principal.has_permission(required)
        {
            return Err(PlaybookError::PermissionDenied(format!(
                "API key lacks the '{required}' permission"
            )));
        }

        debug!(principal = principal.id(), scope = ?scope, "authorized");
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_key("pbk_abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_key("pbk_abc"));
        assert_ne!(h, hash_key("pbk_abd"));
    }
}
