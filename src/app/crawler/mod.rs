//! Fan a payload out across the accounts and regions of a loaded [`Org`].
//!
//! Crawling happens in two separate phases. `load_account_credentials`
//! assumes the account access role in every account of the working set and
//! must finish before `execute` runs the payload once per (account, region).
//! Both phases go through [`run_bounded`], so neither ever has more than
//! `concurrency` calls in flight.
//!
//! A failed credential phase stops the crawl. A failed payload invocation
//! does not: it is recorded in the execution report next to the account and
//! region it failed for.

pub mod execution;

use crate::app::error::CrawlerError;
use crate::app::org::model::Account;
use crate::app::org::{Org, OrgState};
use crate::app::payload::Payload;
use crate::app::regions::{all_regions, is_known_region};
use crate::app::sdk_errors::categorize_error;
use crate::app::task_runner::{run_bounded, TaskOutput};
use execution::{CrawlerExecution, PayloadResponse, ResponseOutcome};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Overrides applied when building a [`Crawler`]
#[derive(Debug, Clone, Default)]
pub struct CrawlerOptions {
    /// Account ids, names or aliases; all accounts when unset
    pub accounts: Option<Vec<String>>,
    /// All regions of the standard partition when unset or empty
    pub regions: Option<Vec<String>>,
    /// Role assumed in each account; the organization's access role when unset
    pub account_access_role: Option<String>,
    /// Bound on in-flight calls; the organization's setting when unset
    pub concurrency: Option<usize>,
}

#[derive(Debug)]
pub struct Crawler {
    org: Org,
    account_ids: Vec<String>,
    regions: Vec<String>,
    access_role: String,
    concurrency: usize,
    executions: Vec<CrawlerExecution>,
}

impl Crawler {
    /// Build a crawler over a populated organization.
    ///
    /// Account identifiers that match no account id or name trigger a one-off
    /// alias lookup with the account access role. A selection that resolves to
    /// nothing targets every account.
    pub async fn new(mut org: Org, options: CrawlerOptions) -> Result<Self, CrawlerError> {
        if org.state() != OrgState::Populated {
            return Err(CrawlerError::InvalidState {
                expected: OrgState::Populated.as_str(),
                actual: org.state().as_str(),
            });
        }

        let access_role = options
            .account_access_role
            .unwrap_or_else(|| org.access_role().to_string());
        let account_ids = select_accounts(
            &mut org,
            &access_role,
            options.accounts.as_deref().unwrap_or_default(),
        )
        .await?;
        let concurrency = options.concurrency.unwrap_or_else(|| org.concurrency()).max(1);

        let mut crawler = Self {
            org,
            account_ids,
            regions: Vec::new(),
            access_role,
            concurrency,
            executions: Vec::new(),
        };
        crawler.update_regions(options.regions.unwrap_or_default());

        debug!(
            "Crawler targets {} accounts in {} regions with role {}",
            crawler.account_ids.len(),
            crawler.regions.len(),
            crawler.access_role
        );
        Ok(crawler)
    }

    pub fn org(&self) -> &Org {
        &self.org
    }

    pub fn into_org(self) -> Org {
        self.org
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn access_role(&self) -> &str {
        &self.access_role
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Accounts of the working set, in organization order
    pub fn accounts(&self) -> Vec<&Account> {
        self.org
            .accounts()
            .iter()
            .filter(|a| self.account_ids.contains(&a.id))
            .collect()
    }

    pub fn executions(&self) -> &[CrawlerExecution] {
        &self.executions
    }

    /// Replace the region list; an empty list means every region
    pub fn update_regions(&mut self, regions: Vec<String>) {
        for region in regions.iter().filter(|r| !is_known_region(r)) {
            crate::trace_warn!("Region {} is not in the standard partition list", region);
        }
        self.regions = if regions.is_empty() {
            all_regions()
        } else {
            regions
        };
    }

    /// Replace the account working set (ids, names or aliases).
    ///
    /// Newly added accounts need `load_account_credentials` before the next
    /// `execute`.
    pub async fn update_accounts(&mut self, identifiers: &[String]) -> Result<(), CrawlerError> {
        self.account_ids = select_accounts(&mut self.org, &self.access_role, identifiers).await?;
        Ok(())
    }

    /// Assume the access role in every working-set account.
    ///
    /// Any failure stops the crawl. When several accounts fail, an access
    /// denied error is reported in preference to the others.
    pub async fn load_account_credentials(&mut self) -> Result<(), CrawlerError> {
        let provider = Arc::clone(&self.org.providers().credentials);
        let role = self.access_role.clone();
        let ids = self.account_ids.clone();

        crate::trace_info!(
            "Resolving credentials for {} accounts with role {}",
            ids.len(),
            role
        );

        let results = run_bounded(ids.clone(), self.concurrency, move |account_id: String| {
            let provider = Arc::clone(&provider);
            let role = role.clone();
            async move { provider.assume_role(&account_id, &role).await }
        })
        .await;

        let mut failure: Option<CrawlerError> = None;
        for TaskOutput { index, outcome } in results {
            let account_id = &ids[index];
            let err = match outcome {
                Ok(Ok(credentials)) => {
                    if let Some(account) = self
                        .org
                        .accounts_mut()
                        .iter_mut()
                        .find(|a| &a.id == account_id)
                    {
                        account.set_credentials(credentials);
                    }
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => CrawlerError::AssumeRole {
                    account_id: account_id.clone(),
                    role_name: self.access_role.clone(),
                    message: e.to_string(),
                },
            };

            let replace = match &failure {
                None => true,
                Some(current) => err.is_fatal() && !current.is_fatal(),
            };
            if replace {
                failure = Some(err);
            }
        }

        if let Some(err) = failure {
            crate::trace_error!("Credential phase failed: {}", err);
            return Err(err);
        }
        Ok(())
    }

    /// Run `payload` once per (account, region) of the working set
    pub async fn execute(
        &mut self,
        payload: Arc<dyn Payload>,
        args: &[String],
    ) -> Result<CrawlerExecution, CrawlerError> {
        let accounts: Vec<Account> = self.accounts().into_iter().cloned().collect();
        if let Some(missing) = accounts.iter().find(|a| a.credentials.is_none()) {
            return Err(CrawlerError::CredentialsNotLoaded(missing.id.clone()));
        }

        let targets: Vec<(Account, String)> = accounts
            .iter()
            .flat_map(|account| {
                self.regions
                    .iter()
                    .map(move |region| (account.clone(), region.clone()))
            })
            .collect();
        let context: Vec<(String, String, String)> = targets
            .iter()
            .map(|(account, region)| (account.id.clone(), account.name.clone(), region.clone()))
            .collect();

        crate::trace_info!(
            "Executing {} in {} accounts x {} regions ({} invocations)",
            payload.name(),
            accounts.len(),
            self.regions.len(),
            targets.len()
        );

        let started = Instant::now();
        let shared_args = Arc::new(args.to_vec());
        let results = {
            let payload = Arc::clone(&payload);
            run_bounded(targets, self.concurrency, move |(account, region): (Account, String)| {
                let payload = Arc::clone(&payload);
                let args = Arc::clone(&shared_args);
                async move { payload.run(&region, &account, &args).await }
            })
            .await
        };

        let responses: Vec<PayloadResponse> = results
            .into_iter()
            .map(|TaskOutput { index, outcome }| {
                let (account_id, account_name, region) = context[index].clone();
                let outcome = match outcome {
                    Ok(Ok(payload_output)) => ResponseOutcome::Success { payload_output },
                    Ok(Err(e)) => {
                        warn!(
                            "{} failed in account {} ({}) region {}: {:#}",
                            payload.name(),
                            account_name,
                            account_id,
                            region,
                            e
                        );
                        ResponseOutcome::Failure {
                            error: format!("{:#}", e),
                            category: categorize_error(&e).label().to_string(),
                        }
                    }
                    Err(e) => {
                        error!(
                            "{} did not complete in account {} region {}: {}",
                            payload.name(),
                            account_id,
                            region,
                            e
                        );
                        ResponseOutcome::Failure {
                            error: e.to_string(),
                            category: "panic".to_string(),
                        }
                    }
                };
                PayloadResponse {
                    account_id,
                    account_name,
                    region,
                    outcome,
                }
            })
            .collect();

        let execution = CrawlerExecution {
            payload_name: payload.name().to_string(),
            args: args.to_vec(),
            responses,
            elapsed: started.elapsed(),
        };

        crate::trace_info!(
            "{} finished in {:?}: {} succeeded, {} failed",
            execution.payload_name,
            execution.elapsed,
            execution.succeeded_count(),
            execution.failed_count()
        );

        self.executions.push(execution.clone());
        Ok(execution)
    }

    /// Most recent execution of the payload called `name`
    pub fn get_execution(&self, name: &str) -> Option<&CrawlerExecution> {
        self.executions.iter().rev().find(|e| e.payload_name == name)
    }

    /// Every response produced by payloads called `name`, across executions
    pub fn get_payload_response_by_name(&self, name: &str) -> Vec<&PayloadResponse> {
        self.executions
            .iter()
            .filter(|e| e.payload_name == name)
            .flat_map(|e| e.responses.iter())
            .collect()
    }
}

/// Account ids for `identifiers` (ids, names or aliases), in first-seen order.
/// No usable identifier means every account.
async fn select_accounts(
    org: &mut Org,
    alias_role: &str,
    identifiers: &[String],
) -> Result<Vec<String>, CrawlerError> {
    let identifiers: Vec<&str> = identifiers
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect();
    if identifiers.is_empty() {
        return Ok(org.list_accounts_by_id());
    }

    let unmatched = identifiers.iter().any(|i| org.get_account(i).is_err());
    if unmatched {
        debug!("Account selection names unknown ids or names, resolving aliases");
        org.resolve_aliases(alias_role).await?;
    }

    let mut ids: Vec<String> = Vec::new();
    for identifier in identifiers {
        let id = org.get_account(identifier)?.id.clone();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
