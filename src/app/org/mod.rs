//! The organization façade.
//!
//! [`Org`] loads the tree of accounts and organizational units owned by one
//! master account, either from a fresh cache record or live from the
//! organizations API, and answers lookup and listing questions over it.
//!
//! A live load walks four steps, each of which may only run once the previous
//! one has completed:
//!
//! ```text
//! Uninitialized --get_client--> ClientReady --load_metadata--> MetadataLoaded
//!     --load_accounts + load_org_units--> Populated
//! ```
//!
//! Only the master account is touched during a load. Account aliases are
//! fetched separately by [`Org::resolve_aliases`], with whatever role the
//! caller uses for member accounts.
//!
//! Listings return nodes in the order the provider returned them. Callers that
//! need a stable order must sort.

pub mod cache;
pub mod model;

use crate::app::credentials::Providers;
use crate::app::error::CrawlerError;
use crate::app::organizations::OrganizationsApi;
use crate::app::task_runner::{run_bounded, TaskOutput, DEFAULT_CONCURRENCY};
use cache::{CacheKey, OrgCacheStore};
use model::{Account, ChildIndex, OrgRecord, OrganizationalUnit};
use std::sync::Arc;
use tracing::{debug, warn};

/// Load progress of an [`Org`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrgState {
    Uninitialized,
    ClientReady,
    MetadataLoaded,
    Populated,
}

impl OrgState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgState::Uninitialized => "Uninitialized",
            OrgState::ClientReady => "ClientReady",
            OrgState::MetadataLoaded => "MetadataLoaded",
            OrgState::Populated => "Populated",
        }
    }
}

impl std::fmt::Display for OrgState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Org {
    master_account_id: String,
    access_role: String,
    providers: Providers,
    cache: Arc<dyn OrgCacheStore>,
    concurrency: usize,
    state: OrgState,
    client: Option<Arc<dyn OrganizationsApi>>,
    id: String,
    root_id: String,
    accounts: Vec<Account>,
    org_units: Vec<OrganizationalUnit>,
    accounts_loaded: bool,
    org_units_loaded: bool,
}

impl std::fmt::Debug for Org {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Org")
            .field("id", &self.id)
            .field("root_id", &self.root_id)
            .field("master_account_id", &self.master_account_id)
            .field("access_role", &self.access_role)
            .field("state", &self.state)
            .field("accounts", &self.accounts.len())
            .field("org_units", &self.org_units.len())
            .finish_non_exhaustive()
    }
}

impl Org {
    pub fn new(
        master_account_id: &str,
        access_role: &str,
        providers: Providers,
        cache: Arc<dyn OrgCacheStore>,
    ) -> Self {
        Self {
            master_account_id: master_account_id.to_string(),
            access_role: access_role.to_string(),
            providers,
            cache,
            concurrency: DEFAULT_CONCURRENCY,
            state: OrgState::Uninitialized,
            client: None,
            id: String::new(),
            root_id: String::new(),
            accounts: Vec::new(),
            org_units: Vec::new(),
            accounts_loaded: false,
            org_units_loaded: false,
        }
    }

    /// Bound on parallel API calls during a live load
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn master_account_id(&self) -> &str {
        &self.master_account_id
    }

    pub fn access_role(&self) -> &str {
        &self.access_role
    }

    pub fn state(&self) -> OrgState {
        self.state
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub(crate) fn accounts_mut(&mut self) -> &mut [Account] {
        &mut self.accounts
    }

    pub fn org_units(&self) -> &[OrganizationalUnit] {
        &self.org_units
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.master_account_id, &self.access_role)
    }

    fn require(&self, expected: OrgState) -> Result<(), CrawlerError> {
        if self.state < expected {
            return Err(CrawlerError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn client(&self) -> Result<Arc<dyn OrganizationsApi>, CrawlerError> {
        self.require(OrgState::ClientReady)?;
        self.client.clone().ok_or(CrawlerError::InvalidState {
            expected: OrgState::ClientReady.as_str(),
            actual: "loaded without a client",
        })
    }

    fn advance(&mut self, to: OrgState) {
        if self.state < to {
            self.state = to;
        }
    }

    fn mark_populated_if_complete(&mut self) {
        if self.accounts_loaded && self.org_units_loaded {
            self.advance(OrgState::Populated);
        }
    }

    /// Assume the access role in the master account and connect to the
    /// organizations API with it
    pub async fn get_client(&mut self) -> Result<(), CrawlerError> {
        let credentials = self
            .providers
            .credentials
            .assume_role(&self.master_account_id, &self.access_role)
            .await?;
        let client = self
            .providers
            .organizations
            .connect(&credentials)
            .await
            .map_err(CrawlerError::Organizations)?;

        self.client = Some(client);
        self.advance(OrgState::ClientReady);
        debug!(
            "Organizations client ready for master account {}",
            self.master_account_id
        );
        Ok(())
    }

    /// Fetch organization id, master account id and root id
    pub async fn load_metadata(&mut self) -> Result<(), CrawlerError> {
        let client = self.client()?;

        let description = client
            .describe_organization()
            .await
            .map_err(CrawlerError::Organizations)?;
        let root_id = client
            .list_roots()
            .await
            .map_err(CrawlerError::Organizations)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CrawlerError::Organizations(anyhow::anyhow!(
                    "organization {} has no root",
                    description.id
                ))
            })?;

        if description.master_account_id != self.master_account_id {
            warn!(
                "Organization {} reports master account {}, not {}",
                description.id, description.master_account_id, self.master_account_id
            );
            self.master_account_id = description.master_account_id;
        }
        self.id = description.id;
        self.root_id = root_id;
        self.advance(OrgState::MetadataLoaded);
        Ok(())
    }

    /// List every account and resolve its parent.
    ///
    /// Aliases stay empty; see [`Org::resolve_aliases`].
    pub async fn load_accounts(&mut self) -> Result<(), CrawlerError> {
        self.require(OrgState::MetadataLoaded)?;
        let client = self.client()?;

        let summaries = client
            .list_accounts()
            .await
            .map_err(CrawlerError::Organizations)?;

        let ids: Vec<String> = summaries.iter().map(|s| s.id.clone()).collect();
        let parents = {
            let client = Arc::clone(&client);
            run_bounded(ids, self.concurrency, move |account_id: String| {
                let client = Arc::clone(&client);
                async move {
                    let parents = client.list_parents(&account_id).await?;
                    parents.into_iter().next().ok_or_else(|| {
                        anyhow::anyhow!("account {} has no parent", account_id)
                    })
                }
            })
            .await
        };
        let parents = in_input_order(parents, summaries.len())?;

        let accounts: Vec<Account> = summaries
            .into_iter()
            .zip(parents)
            .map(|(summary, parent_id)| Account {
                organization_id: self.id.clone(),
                master_account_id: self.master_account_id.clone(),
                name: summary.name,
                id: summary.id,
                parent_id,
                email: summary.email,
                aliases: Vec::new(),
                credentials: None,
            })
            .collect();

        debug!("Loaded {} accounts", accounts.len());
        self.accounts = accounts;
        self.accounts_loaded = true;
        self.mark_populated_if_complete();
        Ok(())
    }

    /// Fill in account aliases by assuming `role` in every account.
    ///
    /// Any failure, access denied included, leaves that account's aliases
    /// empty and is only logged. Does nothing without an alias source.
    pub async fn resolve_aliases(&mut self, role: &str) -> Result<(), CrawlerError> {
        self.require(OrgState::Populated)?;
        let Some(source) = self.providers.aliases.clone() else {
            debug!("No alias source configured, skipping alias resolution");
            return Ok(());
        };
        let provider = Arc::clone(&self.providers.credentials);
        let role = role.to_string();

        let ids: Vec<String> = self.accounts.iter().map(|a| a.id.clone()).collect();
        crate::trace_debug!("Resolving aliases for {} accounts with role {}", ids.len(), role);
        let results = run_bounded(ids, self.concurrency, move |account_id: String| {
            let provider = Arc::clone(&provider);
            let source = Arc::clone(&source);
            let role = role.clone();
            async move {
                let credentials = provider.assume_role(&account_id, &role).await?;
                source
                    .list_account_aliases(&credentials)
                    .await
                    .map_err(CrawlerError::Other)
            }
        })
        .await;

        for TaskOutput { index, outcome } in results {
            let account = &mut self.accounts[index];
            match outcome {
                Ok(Ok(aliases)) => account.aliases = aliases,
                Ok(Err(e)) => {
                    crate::trace_warn!("Could not resolve aliases for account {}: {:#}", account.id, e);
                }
                Err(e) => {
                    crate::trace_warn!("Could not resolve aliases for account {}: {}", account.id, e);
                }
            }
        }
        Ok(())
    }

    /// Walk every organizational unit under the root, one tree level at a time
    pub async fn load_org_units(&mut self) -> Result<(), CrawlerError> {
        self.require(OrgState::MetadataLoaded)?;
        let client = self.client()?;

        let mut org_units = Vec::new();
        let mut frontier = vec![self.root_id.clone()];

        while !frontier.is_empty() {
            let level = {
                let client = Arc::clone(&client);
                run_bounded(frontier.clone(), self.concurrency, move |parent_id: String| {
                    let client = Arc::clone(&client);
                    async move { client.list_organizational_units_for_parent(&parent_id).await }
                })
                .await
            };
            let children = in_input_order(level, frontier.len())?;

            let mut next = Vec::new();
            for (parent_id, summaries) in frontier.iter().zip(children) {
                for summary in summaries {
                    next.push(summary.id.clone());
                    org_units.push(OrganizationalUnit {
                        organization_id: self.id.clone(),
                        master_account_id: self.master_account_id.clone(),
                        name: summary.name,
                        id: summary.id,
                        parent_id: parent_id.clone(),
                    });
                }
            }
            frontier = next;
        }

        debug!("Loaded {} organizational units", org_units.len());
        self.org_units = org_units;
        self.org_units_loaded = true;
        self.mark_populated_if_complete();
        Ok(())
    }

    /// Populate from a fresh cache record, or live when there is none
    pub async fn load(&mut self) -> Result<(), CrawlerError> {
        let key = self.cache_key();
        match self.cache.read(&key) {
            Ok(record) => {
                crate::trace_info!(
                    "Loaded organization {} from cache ({} accounts, {} organizational units)",
                    record.id,
                    record.accounts.len(),
                    record.org_units.len()
                );
                self.load_from_dump(record);
                Ok(())
            }
            Err(miss) => {
                debug!("Organization cache miss for {:?}: {}", key, miss);
                self.load_live(key).await
            }
        }
    }

    /// Ignore the cache, load live and replace the cache record
    pub async fn refresh(&mut self) -> Result<(), CrawlerError> {
        let key = self.cache_key();
        self.state = OrgState::Uninitialized;
        self.client = None;
        self.accounts.clear();
        self.org_units.clear();
        self.accounts_loaded = false;
        self.org_units_loaded = false;
        self.load_live(key).await
    }

    /// Load live and store the record under `key`, the slot the caller read.
    /// The described master account may differ from the one in `key`.
    async fn load_live(&mut self, key: CacheKey) -> Result<(), CrawlerError> {
        self.get_client().await?;
        self.load_metadata().await?;
        self.load_accounts().await?;
        self.load_org_units().await?;

        crate::trace_info!(
            "Loaded organization {} live ({} accounts, {} organizational units)",
            self.id,
            self.accounts.len(),
            self.org_units.len()
        );

        let record = self.dump();
        if let Err(e) = self.cache.write(&key, &record) {
            warn!("Failed to write organization cache: {:#}", e);
        }
        Ok(())
    }

    /// Snapshot of the loaded tree; credentials are left out
    pub fn dump(&self) -> OrgRecord {
        OrgRecord {
            id: self.id.clone(),
            root_id: self.root_id.clone(),
            master_account_id: self.master_account_id.clone(),
            access_role: self.access_role.clone(),
            accounts: self.dump_accounts(),
            org_units: self.dump_org_units(),
        }
    }

    pub fn dump_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.dump())?)
    }

    /// Replace the tree with `record` and mark the organization populated
    pub fn load_from_dump(&mut self, record: OrgRecord) {
        let dangling = record.dangling_parents();
        if !dangling.is_empty() {
            warn!(
                "Organization record {} has nodes with unknown parents: {:?}",
                record.id, dangling
            );
        }

        self.id = record.id;
        self.root_id = record.root_id;
        self.master_account_id = record.master_account_id;
        self.access_role = record.access_role;
        self.accounts = record.accounts;
        self.org_units = record.org_units;
        self.accounts_loaded = true;
        self.org_units_loaded = true;
        self.state = OrgState::Populated;
    }

    // Lookups

    /// Account by id, name or alias
    pub fn get_account(&self, identifier: &str) -> Result<&Account, CrawlerError> {
        self.accounts
            .iter()
            .find(|a| a.matches(identifier))
            .ok_or_else(|| CrawlerError::account_not_found(identifier))
    }

    pub fn get_account_by_id(&self, account_id: &str) -> Result<&Account, CrawlerError> {
        self.accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| CrawlerError::account_not_found(account_id))
    }

    pub fn get_account_id_by_name(&self, name: &str) -> Result<String, CrawlerError> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.id.clone())
            .ok_or_else(|| CrawlerError::account_not_found(name))
    }

    pub fn get_account_name_by_id(&self, account_id: &str) -> Result<String, CrawlerError> {
        Ok(self.get_account_by_id(account_id)?.name.clone())
    }

    /// Organizational unit by id or name
    pub fn get_org_unit(&self, identifier: &str) -> Result<&OrganizationalUnit, CrawlerError> {
        self.org_units
            .iter()
            .find(|ou| ou.id == identifier || ou.name == identifier)
            .ok_or_else(|| CrawlerError::org_unit_not_found(identifier))
    }

    /// Id of an organizational unit by id or name; the root id resolves to itself
    pub fn get_org_unit_id(&self, identifier: &str) -> Result<String, CrawlerError> {
        if !self.root_id.is_empty() && identifier == self.root_id {
            return Ok(self.root_id.clone());
        }
        Ok(self.get_org_unit(identifier)?.id.clone())
    }

    // Listings

    pub fn list_accounts_by_name(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.name.clone()).collect()
    }

    pub fn list_accounts_by_id(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.id.clone()).collect()
    }

    pub fn list_org_units_by_name(&self) -> Vec<String> {
        self.org_units.iter().map(|ou| ou.name.clone()).collect()
    }

    pub fn list_org_units_by_id(&self) -> Vec<String> {
        self.org_units.iter().map(|ou| ou.id.clone()).collect()
    }

    /// Accounts without their credentials
    pub fn dump_accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|a| Account {
                credentials: None,
                ..a.clone()
            })
            .collect()
    }

    pub fn dump_org_units(&self) -> Vec<OrganizationalUnit> {
        self.org_units.clone()
    }

    /// Direct member accounts of an organizational unit (or the root)
    pub fn list_accounts_in_ou(&self, ou: &str) -> Result<Vec<&Account>, CrawlerError> {
        let ou_id = self.get_org_unit_id(ou)?;
        Ok(self.accounts.iter().filter(|a| a.parent_id == ou_id).collect())
    }

    pub fn list_accounts_in_ou_by_name(&self, ou: &str) -> Result<Vec<String>, CrawlerError> {
        Ok(self
            .list_accounts_in_ou(ou)?
            .into_iter()
            .map(|a| a.name.clone())
            .collect())
    }

    pub fn list_accounts_in_ou_by_id(&self, ou: &str) -> Result<Vec<String>, CrawlerError> {
        Ok(self
            .list_accounts_in_ou(ou)?
            .into_iter()
            .map(|a| a.id.clone())
            .collect())
    }

    /// Direct child organizational units
    pub fn list_org_units_in_ou(&self, ou: &str) -> Result<Vec<&OrganizationalUnit>, CrawlerError> {
        let ou_id = self.get_org_unit_id(ou)?;
        Ok(self
            .org_units
            .iter()
            .filter(|child| child.parent_id == ou_id)
            .collect())
    }

    /// Every organizational unit below `ou`, parents before children
    pub fn list_org_units_under_ou(
        &self,
        ou: &str,
    ) -> Result<Vec<&OrganizationalUnit>, CrawlerError> {
        let ou_id = self.get_org_unit_id(ou)?;
        Ok(ChildIndex::build(&self.accounts, &self.org_units).org_units_under(&ou_id))
    }

    /// Every account in `ou` or any organizational unit below it
    pub fn list_accounts_under_ou(&self, ou: &str) -> Result<Vec<&Account>, CrawlerError> {
        let ou_id = self.get_org_unit_id(ou)?;
        Ok(ChildIndex::build(&self.accounts, &self.org_units).accounts_under(&ou_id))
    }
}

/// Unwrap a task-runner batch back into input order, failing on the first error
fn in_input_order<R>(
    outputs: Vec<TaskOutput<anyhow::Result<R>>>,
    len: usize,
) -> Result<Vec<R>, CrawlerError> {
    let mut slots: Vec<Option<R>> = (0..len).map(|_| None).collect();
    for TaskOutput { index, outcome } in outputs {
        match outcome {
            Ok(Ok(value)) => slots[index] = Some(value),
            Ok(Err(e)) => return Err(CrawlerError::Organizations(e)),
            Err(e) => return Err(CrawlerError::Organizations(anyhow::Error::new(e))),
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                CrawlerError::Organizations(anyhow::anyhow!("no result for item {}", index))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(OrgState::Uninitialized < OrgState::ClientReady);
        assert!(OrgState::ClientReady < OrgState::MetadataLoaded);
        assert!(OrgState::MetadataLoaded < OrgState::Populated);
        assert_eq!(OrgState::MetadataLoaded.to_string(), "MetadataLoaded");
    }

    #[test]
    fn test_in_input_order() {
        let outputs = vec![
            TaskOutput {
                index: 1,
                outcome: Ok(Ok("b")),
            },
            TaskOutput {
                index: 0,
                outcome: Ok(Ok("a")),
            },
        ];
        assert_eq!(in_input_order(outputs, 2).unwrap(), vec!["a", "b"]);

        let failed: Vec<TaskOutput<anyhow::Result<&str>>> = vec![TaskOutput {
            index: 0,
            outcome: Ok(Err(anyhow::anyhow!("ListParents failed"))),
        }];
        assert!(matches!(
            in_input_order(failed, 1),
            Err(CrawlerError::Organizations(_))
        ));

        let missing: Vec<TaskOutput<anyhow::Result<&str>>> = Vec::new();
        assert!(in_input_order(missing, 1).is_err());
    }
}
