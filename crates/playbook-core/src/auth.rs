use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaybookError;

/// Permission scopes a privileged tool can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "memory:write")]
    MemoryWrite,
    #[serde(rename = "skills:write")]
    SkillsWrite,
    #[serde(rename = "playbook:write")]
    PlaybookWrite,
}

impl Permission {
    pub const ALL: [Permission; 3] = [
        Permission::MemoryWrite,
        Permission::SkillsWrite,
        Permission::PlaybookWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::MemoryWrite => "memory:write",
            Permission::SkillsWrite => "skills:write",
            Permission::PlaybookWrite => "playbook:write",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = PlaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PlaybookError::Validation(format!("unknown permission scope '{s}'")))
    }
}

/// Whoever the authorizer vouched for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User {
        user_id: String,
    },
    ApiKey {
        key_id: String,
        playbook_id: String,
        /// Scope strings; `"*"` grants everything.
        permissions: Vec<String>,
    },
}

impl Principal {
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self {
            Principal::User { .. } => true,
            Principal::ApiKey { permissions, .. } => permissions
                .iter()
                .any(|p| p == "*" || p == permission.as_str()),
        }
    }

    /// Identifier used in logs.
    pub fn id(&self) -> &str {
        match self {
            Principal::User { user_id } => user_id,
            Principal::ApiKey { key_id, .. } => key_id,
        }
    }
}

/// The identity/authorization collaborator.
///
/// Given the raw bearer credential, the playbook being accessed, and an optional
/// required scope, returns the principal or [`PlaybookError::PermissionDenied`].
/// `scope = None` asks only whether the credential may access the playbook at all.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        credential: Option<&str>,
        playbook_id: &str,
        scope: Option<Permission>,
    ) -> crate::Result<Principal>;
}
