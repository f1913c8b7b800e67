//! In-memory organization used by the integration tests.
//!
//! An organization is described by a YAML tree of organizational units and
//! account names; [`FakeOrganization::from_spec`] assigns deterministic ids and
//! the fakes below serve it through the same seams the SDK implementations
//! plug into.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use orgcrawler::app::credentials::{AccountCredentials, CredentialProvider, Providers};
use orgcrawler::app::error::CrawlerError;
use orgcrawler::app::org::cache::OrgCacheStore;
use orgcrawler::app::org::Org;
use orgcrawler::app::organizations::{
    AccountSummary, AliasSource, OrganizationDescription, OrganizationalUnitSummary,
    OrganizationsApi, OrganizationsConnector,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ORG_ACCESS_ROLE: &str = "myrole";
pub const MASTER_ACCOUNT_ID: &str = "123456789012";
pub const ORG_ID: &str = "o-exampleorg";
pub const ROOT_ID: &str = "r-0001";

pub const SIMPLE_ORG_SPEC: &str = r#"
root:
  - name: root
    accounts:
    - account01
    - account02
    - account03
    child_ou:
      - name: ou01
        child_ou:
          - name: ou01-sub0
      - name: ou02
        child_ou:
          - name: ou02-sub0
      - name: ou03
        child_ou:
          - name: ou03-sub0
"#;

pub const COMPLEX_ORG_SPEC: &str = r#"
root:
  - name: root
    accounts:
    - account01
    - account02
    - account03
    child_ou:
      - name: ou01
        accounts:
        - account04
        - account05
        child_ou:
          - name: ou01-1
            accounts:
            - account08
          - name: ou01-2
            accounts:
            - account09
            - account10
      - name: ou02
        accounts:
        - account06
        - account07
        child_ou:
          - name: ou02-1
            accounts:
            - account11
          - name: ou02-2
            accounts:
            - account12
            - account13
"#;

#[derive(Debug, Deserialize)]
struct OrgSpec {
    root: Vec<OuSpec>,
}

#[derive(Debug, Deserialize)]
struct OuSpec {
    name: String,
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(default)]
    child_ou: Vec<OuSpec>,
}

/// Accounts and OUs with ids and parents, in creation order
#[derive(Debug, Default)]
pub struct FakeOrganization {
    pub accounts: Vec<(AccountSummary, String)>,
    pub org_units: Vec<(OrganizationalUnitSummary, String)>,
}

impl FakeOrganization {
    pub fn from_spec(spec: &str) -> Self {
        let spec: OrgSpec = serde_yaml::from_str(spec).expect("valid org spec");
        let mut org = FakeOrganization::default();
        for ou in &spec.root {
            org.add(ou, None);
        }
        org
    }

    fn add(&mut self, spec: &OuSpec, parent_id: Option<&str>) {
        let ou_id = match parent_id {
            None => ROOT_ID.to_string(),
            Some(parent_id) => {
                let id = format!("ou-0001-{:08}", self.org_units.len() + 1);
                self.org_units.push((
                    OrganizationalUnitSummary {
                        id: id.clone(),
                        name: spec.name.clone(),
                    },
                    parent_id.to_string(),
                ));
                id
            }
        };

        for name in &spec.accounts {
            let id = format!("{:012}", 100_000_000_001u64 + self.accounts.len() as u64);
            self.accounts.push((
                AccountSummary {
                    id,
                    name: name.clone(),
                    email: format!("{}@example.com", name),
                },
                ou_id.clone(),
            ));
        }

        for child in &spec.child_ou {
            self.add(child, Some(&ou_id));
        }
    }

    pub fn account_id(&self, name: &str) -> String {
        self.accounts
            .iter()
            .find(|(a, _)| a.name == name)
            .map(|(a, _)| a.id.clone())
            .expect("account in spec")
    }
}

/// Counts of calls that reached the fake organizations API
#[derive(Debug, Default)]
pub struct ApiCalls {
    pub connect: AtomicUsize,
    pub describe_organization: AtomicUsize,
    pub list_accounts: AtomicUsize,
    pub list_parents: AtomicUsize,
    pub list_organizational_units_for_parent: AtomicUsize,
}

impl ApiCalls {
    pub fn total(&self) -> usize {
        self.connect.load(Ordering::SeqCst)
            + self.describe_organization.load(Ordering::SeqCst)
            + self.list_accounts.load(Ordering::SeqCst)
            + self.list_parents.load(Ordering::SeqCst)
            + self.list_organizational_units_for_parent.load(Ordering::SeqCst)
    }
}

pub struct FakeOrganizationsApi {
    org: Arc<FakeOrganization>,
    calls: Arc<ApiCalls>,
    fail_describe: bool,
    reported_master: String,
}

#[async_trait]
impl OrganizationsApi for FakeOrganizationsApi {
    async fn describe_organization(&self) -> Result<OrganizationDescription> {
        self.calls.describe_organization.fetch_add(1, Ordering::SeqCst);
        if self.fail_describe {
            return Err(anyhow!(
                "AWSOrganizationsNotInUseException: Your account is not a member of an organization."
            ));
        }
        Ok(OrganizationDescription {
            id: ORG_ID.to_string(),
            master_account_id: self.reported_master.clone(),
        })
    }

    async fn list_roots(&self) -> Result<Vec<String>> {
        Ok(vec![ROOT_ID.to_string()])
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        self.calls.list_accounts.fetch_add(1, Ordering::SeqCst);
        Ok(self.org.accounts.iter().map(|(a, _)| a.clone()).collect())
    }

    async fn list_parents(&self, child_id: &str) -> Result<Vec<String>> {
        self.calls.list_parents.fetch_add(1, Ordering::SeqCst);
        self.org
            .accounts
            .iter()
            .find(|(a, _)| a.id == child_id)
            .map(|(_, parent)| vec![parent.clone()])
            .or_else(|| {
                self.org
                    .org_units
                    .iter()
                    .find(|(ou, _)| ou.id == child_id)
                    .map(|(_, parent)| vec![parent.clone()])
            })
            .ok_or_else(|| anyhow!("ChildNotFoundException: {}", child_id))
    }

    async fn list_organizational_units_for_parent(
        &self,
        parent_id: &str,
    ) -> Result<Vec<OrganizationalUnitSummary>> {
        self.calls
            .list_organizational_units_for_parent
            .fetch_add(1, Ordering::SeqCst);
        Ok(self
            .org
            .org_units
            .iter()
            .filter(|(_, parent)| parent == parent_id)
            .map(|(ou, _)| ou.clone())
            .collect())
    }
}

pub struct FakeConnector {
    org: Arc<FakeOrganization>,
    calls: Arc<ApiCalls>,
    fail_describe: AtomicBool,
    reported_master: Mutex<String>,
}

#[async_trait]
impl OrganizationsConnector for FakeConnector {
    async fn connect(&self, credentials: &AccountCredentials) -> Result<Arc<dyn OrganizationsApi>> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        if credentials.account_id != MASTER_ACCOUNT_ID {
            return Err(anyhow!(
                "AccessDeniedException: account {} is not the management account",
                credentials.account_id
            ));
        }
        Ok(Arc::new(FakeOrganizationsApi {
            org: Arc::clone(&self.org),
            calls: Arc::clone(&self.calls),
            fail_describe: self.fail_describe.load(Ordering::SeqCst),
            reported_master: self.reported_master.lock().unwrap().clone(),
        }))
    }
}

/// Role assumption that succeeds unless an account is marked denied or broken
#[derive(Default)]
pub struct FakeCredentialProvider {
    denied: Mutex<HashSet<String>>,
    /// (account id, role name) pairs denied on their own
    denied_roles: Mutex<HashSet<(String, String)>>,
    broken: Mutex<HashSet<String>>,
    /// (account id, role name) of every call
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeCredentialProvider {
    pub fn deny(&self, account_id: &str) {
        self.denied.lock().unwrap().insert(account_id.to_string());
    }

    /// Deny only `role_name` in `account_id`; other roles still work there
    pub fn deny_role(&self, account_id: &str, role_name: &str) {
        self.denied_roles
            .lock()
            .unwrap()
            .insert((account_id.to_string(), role_name.to_string()));
    }

    pub fn break_account(&self, account_id: &str) {
        self.broken.lock().unwrap().insert(account_id.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn roles_used(&self) -> HashSet<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, role)| role.clone())
            .collect()
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentialProvider {
    async fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
    ) -> Result<AccountCredentials, CrawlerError> {
        self.calls
            .lock()
            .unwrap()
            .push((account_id.to_string(), role_name.to_string()));

        let role_denied = self
            .denied_roles
            .lock()
            .unwrap()
            .contains(&(account_id.to_string(), role_name.to_string()));
        if role_denied || self.denied.lock().unwrap().contains(account_id) {
            return Err(CrawlerError::AccessDenied {
                account_id: account_id.to_string(),
                role_name: role_name.to_string(),
            });
        }
        if self.broken.lock().unwrap().contains(account_id) {
            return Err(CrawlerError::AssumeRole {
                account_id: account_id.to_string(),
                role_name: role_name.to_string(),
                message: "RegionDisabledException: STS is not activated".to_string(),
            });
        }

        Ok(AccountCredentials {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            access_key_id: format!("ASIA{}", account_id),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: None,
        })
    }

    async fn caller_account_id(&self) -> Result<String, CrawlerError> {
        Ok(MASTER_ACCOUNT_ID.to_string())
    }
}

/// Aliases are `<account name>-alias`; listed accounts fail
pub struct FakeAliasSource {
    names: HashMap<String, String>,
    failing: Mutex<HashSet<String>>,
}

impl FakeAliasSource {
    pub fn fail_for(&self, account_id: &str) {
        self.failing.lock().unwrap().insert(account_id.to_string());
    }
}

#[async_trait]
impl AliasSource for FakeAliasSource {
    async fn list_account_aliases(&self, credentials: &AccountCredentials) -> Result<Vec<String>> {
        if self.failing.lock().unwrap().contains(&credentials.account_id) {
            return Err(anyhow!("ThrottlingException: Rate exceeded"));
        }
        Ok(self
            .names
            .get(&credentials.account_id)
            .map(|name| vec![format!("{}-alias", name)])
            .unwrap_or_default())
    }
}

/// A fake organization wired into a [`Providers`] bundle
pub struct Harness {
    pub org: Arc<FakeOrganization>,
    pub api_calls: Arc<ApiCalls>,
    pub credentials: Arc<FakeCredentialProvider>,
    pub connector: Arc<FakeConnector>,
    pub aliases: Arc<FakeAliasSource>,
}

impl Harness {
    pub fn new(spec: &str) -> Self {
        let org = Arc::new(FakeOrganization::from_spec(spec));
        let api_calls = Arc::new(ApiCalls::default());
        let connector = Arc::new(FakeConnector {
            org: Arc::clone(&org),
            calls: Arc::clone(&api_calls),
            fail_describe: AtomicBool::new(false),
            reported_master: Mutex::new(MASTER_ACCOUNT_ID.to_string()),
        });
        let aliases = Arc::new(FakeAliasSource {
            names: org
                .accounts
                .iter()
                .map(|(a, _)| (a.id.clone(), a.name.clone()))
                .collect(),
            failing: Mutex::new(HashSet::new()),
        });
        Self {
            org,
            api_calls,
            credentials: Arc::new(FakeCredentialProvider::default()),
            connector,
            aliases,
        }
    }

    pub fn fail_describe_organization(&self) {
        self.connector.fail_describe.store(true, Ordering::SeqCst);
    }

    /// Make `DescribeOrganization` name another master account
    pub fn report_master_account(&self, account_id: &str) {
        *self.connector.reported_master.lock().unwrap() = account_id.to_string();
    }

    pub fn providers(&self) -> Providers {
        Providers {
            credentials: self.credentials.clone(),
            organizations: self.connector.clone(),
            aliases: Some(self.aliases.clone()),
        }
    }

    pub fn new_org(&self, cache: Arc<dyn OrgCacheStore>) -> Org {
        Org::new(MASTER_ACCOUNT_ID, ORG_ACCESS_ROLE, self.providers(), cache)
    }

    /// An organization populated live, with an in-memory cache
    pub async fn loaded_org(&self) -> Org {
        let mut org = self.new_org(Arc::new(orgcrawler::app::org::cache::MemoryCacheStore::default()));
        org.load().await.expect("organization loads");
        org
    }
}
