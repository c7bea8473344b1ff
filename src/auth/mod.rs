//! Bearer token authentication and role checks.
//!
//! Tokens are issued by an external identity provider and configured here as
//! opaque values mapped to a subject and role. This module only checks them.

use std::collections::HashMap;
use thiserror::Error;

use crate::config::{AuthConfig, Role};

/// The caller a request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }

    /// Caller used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self::new("anonymous", Role::Admin)
    }

    /// Caller used by unauthenticated public routes.
    pub fn public() -> Self {
        Self::new("public", Role::Viewer)
    }

    pub fn can(&self, permission: Permission) -> bool {
        role_allows(self.role, permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), AuthError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                role: self.role.as_str(),
                permission: permission.as_str(),
            })
        }
    }
}

/// Actions guarded by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Ingest,
    Attest,
    ReviewAttestation,
    Forensics,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Ingest => "ingest",
            Permission::Attest => "attest",
            Permission::ReviewAttestation => "review_attestation",
            Permission::Forensics => "forensics",
        }
    }
}

fn role_allows(role: Role, permission: Permission) -> bool {
    match role {
        Role::Admin => true,
        Role::Underwriter => matches!(
            permission,
            Permission::Read | Permission::Ingest | Permission::Attest
        ),
        Role::Auditor => matches!(
            permission,
            Permission::Read
                | Permission::Attest
                | Permission::ReviewAttestation
                | Permission::Forensics
        ),
        Role::Viewer => permission == Permission::Read,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,

    #[error("role '{role}' may not {permission}")]
    Forbidden {
        role: &'static str,
        permission: &'static str,
    },
}

/// Lookup table from token to principal.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    enabled: bool,
    tokens: HashMap<String, Principal>,
}

impl TokenStore {
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| (t.token.clone(), Principal::new(t.subject.clone(), t.role)))
            .collect();
        Self {
            enabled: config.enabled,
            tokens,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        if !self.enabled {
            return Ok(Principal::anonymous());
        }

        let value = authorization.ok_or(AuthError::MissingToken)?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;

    fn store() -> TokenStore {
        TokenStore::from_config(&AuthConfig {
            enabled: true,
            tokens: vec![TokenConfig {
                token: "t-under".into(),
                subject: "uma".into(),
                role: Role::Underwriter,
            }],
        })
    }

    #[test]
    fn test_authenticate() {
        let store = store();
        let p = store.authenticate(Some("Bearer t-under")).unwrap();
        assert_eq!(p.subject, "uma");
        assert_eq!(store.authenticate(None), Err(AuthError::MissingToken));
        assert_eq!(store.authenticate(Some("Basic abc")), Err(AuthError::MissingToken));
        assert_eq!(store.authenticate(Some("Bearer nope")), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_disabled_store_is_anonymous_admin() {
        let store = TokenStore::default();
        assert_eq!(store.authenticate(None).unwrap(), Principal::anonymous());
    }

    #[test]
    fn test_role_matrix() {
        let underwriter = Principal::new("u", Role::Underwriter);
        assert!(underwriter.can(Permission::Ingest));
        assert!(!underwriter.can(Permission::Forensics));

        let auditor = Principal::new("a", Role::Auditor);
        assert!(auditor.can(Permission::Forensics));
        assert!(!auditor.can(Permission::Ingest));

        let viewer = Principal::new("v", Role::Viewer);
        let err = viewer.require(Permission::Attest).unwrap_err();
        assert_eq!(err.to_string(), "role 'viewer' may not attest");
    }
}
