//! Error taxonomy of the crawler core.
//!
//! `AccessDenied` is the only fatal kind: a principal that cannot assume the
//! configured role makes the rest of the crawl meaningless, so the binary
//! stops with a dedicated exit status. Cache misses are not errors at all (see
//! [`crate::app::org::cache::CacheMiss`]) and per-invocation payload failures
//! are captured inside the execution report instead of being raised.

use thiserror::Error;

/// Kind of organization node a lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Account,
    OrganizationalUnit,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Account => write!(f, "account"),
            NodeKind::OrganizationalUnit => write!(f, "organizational unit"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("cannot assume role {role_name} in account {account_id}: AccessDenied")]
    AccessDenied {
        account_id: String,
        role_name: String,
    },

    #[error("cannot assume role {role_name} in account {account_id}: {message}")]
    AssumeRole {
        account_id: String,
        role_name: String,
        message: String,
    },

    #[error("{kind} not found: {identifier}")]
    NotFound { kind: NodeKind, identifier: String },

    #[error("organization is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("credentials not loaded for account {0}")]
    CredentialsNotLoaded(String),

    #[error("unknown payload: {0}")]
    UnknownPayload(String),

    #[error("organizations API error: {0:#}")]
    Organizations(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlerError {
    /// True for conditions that must terminate the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlerError::AccessDenied { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CrawlerError::NotFound { .. })
    }

    pub(crate) fn account_not_found(identifier: &str) -> Self {
        CrawlerError::NotFound {
            kind: NodeKind::Account,
            identifier: identifier.to_string(),
        }
    }

    pub(crate) fn org_unit_not_found(identifier: &str) -> Self {
        CrawlerError::NotFound {
            kind: NodeKind::OrganizationalUnit,
            identifier: identifier.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_access_denied_is_fatal() {
        let denied = CrawlerError::AccessDenied {
            account_id: "123456789012".to_string(),
            role_name: "OrgMasterRole".to_string(),
        };
        assert!(denied.is_fatal());
        assert_eq!(
            denied.to_string(),
            "cannot assume role OrgMasterRole in account 123456789012: AccessDenied"
        );

        let other = CrawlerError::AssumeRole {
            account_id: "123456789012".to_string(),
            role_name: "OrgMasterRole".to_string(),
            message: "dispatch failure".to_string(),
        };
        assert!(!other.is_fatal());
        assert!(!CrawlerError::account_not_found("prod").is_fatal());
    }

    #[test]
    fn test_not_found_message() {
        let err = CrawlerError::org_unit_not_found("ou-missing");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "organizational unit not found: ou-missing");
    }
}
