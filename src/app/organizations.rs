//! Seams over the AWS Organizations and IAM APIs.
//!
//! The organization loader only needs a handful of read calls. They sit behind
//! [`OrganizationsApi`] so the tree model, the cache and the state machine can be
//! exercised against an in-memory organization; [`AwsOrganizationsApi`] is the
//! SDK implementation. Every list call pages to completion.

use crate::app::credentials::AccountCredentials;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_organizations as organizations;
use std::sync::Arc;
use tracing::debug;

/// Organization identity as returned by `DescribeOrganization`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationDescription {
    pub id: String,
    pub master_account_id: String,
}

/// One entry of `ListAccounts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// One entry of `ListOrganizationalUnitsForParent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationalUnitSummary {
    pub id: String,
    pub name: String,
}

/// Read-only organization-management calls used to materialize the tree
#[async_trait]
pub trait OrganizationsApi: Send + Sync {
    async fn describe_organization(&self) -> Result<OrganizationDescription>;

    /// Root ids; AWS organizations have exactly one
    async fn list_roots(&self) -> Result<Vec<String>>;

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>>;

    /// Parent ids (root or OU) of an account or OU
    async fn list_parents(&self, child_id: &str) -> Result<Vec<String>>;

    /// Direct child OUs of `parent_id`
    async fn list_organizational_units_for_parent(
        &self,
        parent_id: &str,
    ) -> Result<Vec<OrganizationalUnitSummary>>;
}

/// Builds an [`OrganizationsApi`] that signs with a given credential set
#[async_trait]
pub trait OrganizationsConnector: Send + Sync {
    async fn connect(&self, credentials: &AccountCredentials) -> Result<Arc<dyn OrganizationsApi>>;
}

/// Looks up the human-readable aliases of an account
#[async_trait]
pub trait AliasSource: Send + Sync {
    async fn list_account_aliases(&self, credentials: &AccountCredentials) -> Result<Vec<String>>;
}

/// [`OrganizationsApi`] over `aws-sdk-organizations`
#[derive(Clone, Debug)]
pub struct AwsOrganizationsApi {
    client: organizations::Client,
}

impl AwsOrganizationsApi {
    pub fn new(client: organizations::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrganizationsApi for AwsOrganizationsApi {
    async fn describe_organization(&self) -> Result<OrganizationDescription> {
        let response = self
            .client
            .describe_organization()
            .send()
            .await
            .context("DescribeOrganization failed")?;

        let org = response
            .organization
            .ok_or_else(|| anyhow::anyhow!("Organization not found"))?;

        Ok(OrganizationDescription {
            id: org.id.context("Organization has no id")?,
            master_account_id: org
                .master_account_id
                .context("Organization has no master account id")?,
        })
    }

    async fn list_roots(&self) -> Result<Vec<String>> {
        let mut roots = Vec::new();
        let mut paginator = self.client.list_roots().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.context("ListRoots failed")?;
            if let Some(root_summaries) = page.roots {
                roots.extend(root_summaries.into_iter().filter_map(|root| root.id));
            }
        }

        Ok(roots)
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        let mut accounts = Vec::new();
        let mut paginator = self.client.list_accounts().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.context("ListAccounts failed")?;
            if let Some(account_summaries) = page.accounts {
                for account in account_summaries {
                    let Some(id) = account.id else { continue };
                    accounts.push(AccountSummary {
                        name: account.name.unwrap_or_else(|| id.clone()),
                        email: account.email.unwrap_or_default(),
                        id,
                    });
                }
            }
        }

        Ok(accounts)
    }

    async fn list_parents(&self, child_id: &str) -> Result<Vec<String>> {
        let mut parents = Vec::new();
        let mut paginator = self
            .client
            .list_parents()
            .child_id(child_id)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.with_context(|| format!("ListParents failed for {}", child_id))?;
            if let Some(parent_summaries) = page.parents {
                parents.extend(parent_summaries.into_iter().filter_map(|parent| parent.id));
            }
        }

        Ok(parents)
    }

    async fn list_organizational_units_for_parent(
        &self,
        parent_id: &str,
    ) -> Result<Vec<OrganizationalUnitSummary>> {
        let mut org_units = Vec::new();
        let mut paginator = self
            .client
            .list_organizational_units_for_parent()
            .parent_id(parent_id)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.with_context(|| {
                format!("ListOrganizationalUnitsForParent failed for {}", parent_id)
            })?;
            if let Some(ous) = page.organizational_units {
                for ou in ous {
                    let Some(id) = ou.id else { continue };
                    org_units.push(OrganizationalUnitSummary {
                        name: ou.name.unwrap_or_else(|| id.clone()),
                        id,
                    });
                }
            }
        }

        Ok(org_units)
    }
}

/// Connects to the organizations endpoint with explicit credentials
#[derive(Clone, Debug)]
pub struct AwsOrganizationsConnector {
    region: String,
}

impl AwsOrganizationsConnector {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl OrganizationsConnector for AwsOrganizationsConnector {
    async fn connect(&self, credentials: &AccountCredentials) -> Result<Arc<dyn OrganizationsApi>> {
        debug!(
            "Creating organizations client for account {} using role {}",
            credentials.account_id, credentials.role_name
        );
        let config = credentials.sdk_config(&self.region).await;
        Ok(Arc::new(AwsOrganizationsApi::new(organizations::Client::new(
            &config,
        ))))
    }
}

/// [`AliasSource`] calling IAM `ListAccountAliases`
#[derive(Clone, Debug)]
pub struct IamAliasSource {
    region: String,
}

impl IamAliasSource {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl AliasSource for IamAliasSource {
    async fn list_account_aliases(&self, credentials: &AccountCredentials) -> Result<Vec<String>> {
        let config = credentials.sdk_config(&self.region).await;
        let client = IamClient::new(&config);
        let response = client
            .list_account_aliases()
            .send()
            .await
            .with_context(|| {
                format!(
                    "ListAccountAliases failed for account {}",
                    credentials.account_id
                )
            })?;
        Ok(response.account_aliases().to_vec())
    }
}
