//! Organization tree data model.
//!
//! The tree is kept arena style: flat lists of accounts and organizational
//! units linked by `parent_id`. Nothing holds a pointer to its parent or
//! children; hierarchy questions are answered by id lookups and by a
//! [`ChildIndex`] built on demand.

use crate::app::credentials::AccountCredentials;
use crate::app::error::CrawlerError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Fields shared by every node of the organization tree
pub trait OrgNode {
    fn organization_id(&self) -> &str;
    fn master_account_id(&self) -> &str;
    fn name(&self) -> &str;
    /// Provider-assigned identity of the node
    fn id(&self) -> &str;
    /// Root id or the id of the owning organizational unit
    fn parent_id(&self) -> &str;
}

/// A member account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub organization_id: String,
    pub master_account_id: String,
    pub name: String,
    pub id: String,
    pub parent_id: String,
    pub email: String,
    /// Human-readable labels, empty until resolved
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Temporary credentials, empty until resolved. Never serialized.
    #[serde(skip)]
    pub credentials: Option<AccountCredentials>,
}

impl Account {
    /// True when `identifier` is this account's id, name or one of its aliases
    pub fn matches(&self, identifier: &str) -> bool {
        self.id == identifier || self.name == identifier || self.aliases.iter().any(|a| a == identifier)
    }

    /// Resolved credentials, or `CredentialsNotLoaded`
    pub fn credentials(&self) -> Result<&AccountCredentials, CrawlerError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| CrawlerError::CredentialsNotLoaded(self.id.clone()))
    }

    pub fn set_credentials(&mut self, credentials: AccountCredentials) {
        self.credentials = Some(credentials);
    }

    /// SDK config for `region` signed with this account's credentials
    pub async fn sdk_config(&self, region: &str) -> Result<aws_config::SdkConfig, CrawlerError> {
        Ok(self.credentials()?.sdk_config(region).await)
    }
}

impl OrgNode for Account {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }
    fn master_account_id(&self) -> &str {
        &self.master_account_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn parent_id(&self) -> &str {
        &self.parent_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub organization_id: String,
    pub master_account_id: String,
    pub name: String,
    pub id: String,
    pub parent_id: String,
}

impl OrgNode for OrganizationalUnit {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }
    fn master_account_id(&self) -> &str {
        &self.master_account_id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn parent_id(&self) -> &str {
        &self.parent_id
    }
}

/// Serialized snapshot of a loaded organization.
///
/// This is both what `Org::dump` returns and what the cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRecord {
    pub id: String,
    pub root_id: String,
    pub master_account_id: String,
    pub access_role: String,
    pub accounts: Vec<Account>,
    pub org_units: Vec<OrganizationalUnit>,
}

impl OrgRecord {
    /// Ids of nodes whose parent is neither the root nor a known OU
    pub fn dangling_parents(&self) -> Vec<String> {
        let known: HashSet<&str> = self
            .org_units
            .iter()
            .map(|ou| ou.id.as_str())
            .chain(std::iter::once(self.root_id.as_str()))
            .collect();

        self.accounts
            .iter()
            .map(|a| (a.id.as_str(), a.parent_id.as_str()))
            .chain(self.org_units.iter().map(|ou| (ou.id.as_str(), ou.parent_id.as_str())))
            .filter(|(_, parent)| !known.contains(parent))
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Ids of nodes whose organization or master account differs from the record's
    pub fn foreign_nodes(&self) -> Vec<String> {
        self.accounts
            .iter()
            .filter(|a| self.is_foreign(*a))
            .map(|a| a.id.clone())
            .chain(
                self.org_units
                    .iter()
                    .filter(|ou| self.is_foreign(*ou))
                    .map(|ou| ou.id.clone()),
            )
            .collect()
    }

    fn is_foreign<N: OrgNode>(&self, node: &N) -> bool {
        node.organization_id() != self.id || node.master_account_id() != self.master_account_id
    }
}

/// parent id → direct child OU ids and account ids
#[derive(Debug, Default)]
pub struct ChildIndex<'a> {
    org_units: HashMap<&'a str, Vec<&'a OrganizationalUnit>>,
    accounts: HashMap<&'a str, Vec<&'a Account>>,
}

impl<'a> ChildIndex<'a> {
    pub fn build(accounts: &'a [Account], org_units: &'a [OrganizationalUnit]) -> Self {
        let mut index = ChildIndex::default();
        for ou in org_units {
            index.org_units.entry(ou.parent_id.as_str()).or_default().push(ou);
        }
        for account in accounts {
            index
                .accounts
                .entry(account.parent_id.as_str())
                .or_default()
                .push(account);
        }
        index
    }

    pub fn org_units_in(&self, parent_id: &str) -> &[&'a OrganizationalUnit] {
        self.org_units.get(parent_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn accounts_in(&self, parent_id: &str) -> &[&'a Account] {
        self.accounts.get(parent_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every OU below `parent_id`, depth first, parents before children
    pub fn org_units_under(&self, parent_id: &str) -> Vec<&'a OrganizationalUnit> {
        let mut found = Vec::new();
        let mut stack: Vec<&'a OrganizationalUnit> =
            self.org_units_in(parent_id).iter().rev().copied().collect();
        while let Some(ou) = stack.pop() {
            found.push(ou);
            stack.extend(self.org_units_in(&ou.id).iter().rev().copied());
        }
        found
    }

    /// Every account in `parent_id` or any OU below it
    pub fn accounts_under(&self, parent_id: &str) -> Vec<&'a Account> {
        let mut found: Vec<&'a Account> = self.accounts_in(parent_id).to_vec();
        for ou in self.org_units_under(parent_id) {
            found.extend(self.accounts_in(&ou.id).iter().copied());
        }
        found
    }
}
