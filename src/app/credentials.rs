//! Temporary credentials for organization accounts, obtained by role assumption.
//!
//! Every role assumption uses the process's ambient identity (whatever the
//! default AWS credential chain resolves) as the assuming principal. An
//! `AccessDenied` answer from STS is surfaced as [`CrawlerError::AccessDenied`],
//! which callers treat as fatal for the whole run.

use crate::app::error::CrawlerError;
use crate::app::organizations::{
    AliasSource, AwsOrganizationsConnector, IamAliasSource, OrganizationsConnector,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_sts::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_sts::Client as StsClient;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Region used for STS and other global endpoints when nothing is configured
pub const FALLBACK_REGION: &str = "us-east-1";

/// Temporary credentials scoped to one account and role
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub account_id: String,
    pub role_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_id", &self.account_id)
            .field("role_name", &self.role_name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl AccountCredentials {
    /// Check if credentials are expired or will expire within the next 5 minutes.
    ///
    /// Nothing refreshes credentials automatically; a long crawl has to call
    /// `Crawler::load_account_credentials` again.
    pub fn is_expired(&self) -> bool {
        match self.expiration {
            Some(expiration) => Utc::now() + chrono::Duration::minutes(5) >= expiration,
            None => false,
        }
    }

    /// Create AWS SDK Credentials from this account's credentials
    pub fn to_aws_credentials(&self) -> Credentials {
        Credentials::from_keys(
            &self.access_key_id,
            &self.secret_access_key,
            Some(self.session_token.clone()),
        )
    }

    /// Build an SDK config for `region` that signs with these credentials
    pub async fn sdk_config(&self, region: &str) -> aws_config::SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(self.to_aws_credentials())
            .load()
            .await
    }
}

/// IAM role ARN for `role_name` in `account_id`
pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, role_name)
}

/// STS session name: the account id plus the last path segment of the role
pub fn role_session_name(account_id: &str, role_name: &str) -> String {
    let short_role = role_name.rsplit('/').next().unwrap_or(role_name);
    format!("{}-{}", account_id, short_role)
}

/// Source of temporary credentials for (account, role) pairs
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Assume `role_name` in `account_id` using the ambient identity
    async fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
    ) -> Result<AccountCredentials, CrawlerError>;

    /// Account id of the ambient identity
    async fn caller_account_id(&self) -> Result<String, CrawlerError>;
}

/// [`CredentialProvider`] backed by the AWS Security Token Service
#[derive(Clone, Debug)]
pub struct StsCredentialProvider {
    client: StsClient,
}

impl StsCredentialProvider {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: StsClient::new(config),
        }
    }
}

#[async_trait]
impl CredentialProvider for StsCredentialProvider {
    async fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
    ) -> Result<AccountCredentials, CrawlerError> {
        debug!("Assuming role {} in account {}", role_name, account_id);

        let response = self
            .client
            .assume_role()
            .role_arn(role_arn(account_id, role_name))
            .role_session_name(role_session_name(account_id, role_name))
            .send()
            .await
            .map_err(|e| {
                let code = match &e {
                    SdkError::ServiceError(service_err) => service_err.err().code(),
                    _ => None,
                };
                match code {
                    Some("AccessDenied") => CrawlerError::AccessDenied {
                        account_id: account_id.to_string(),
                        role_name: role_name.to_string(),
                    },
                    _ => CrawlerError::AssumeRole {
                        account_id: account_id.to_string(),
                        role_name: role_name.to_string(),
                        message: format!("{}", aws_sdk_sts::error::DisplayErrorContext(&e)),
                    },
                }
            })?;

        let credentials = response.credentials().ok_or_else(|| CrawlerError::AssumeRole {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            message: "AssumeRole response carried no credentials".to_string(),
        })?;

        let expiration = credentials.expiration();
        let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos());

        Ok(AccountCredentials {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }

    async fn caller_account_id(&self) -> Result<String, CrawlerError> {
        let identity = self
            .client
            .get_caller_identity()
            .send()
            .await
            .context("Failed to get caller identity")?;

        identity
            .account()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No account found in caller identity").into())
    }
}

/// External collaborators the organization and crawler layers talk to.
///
/// Tests swap these for in-memory fakes; [`Providers::aws`] wires the SDK.
#[derive(Clone)]
pub struct Providers {
    pub credentials: Arc<dyn CredentialProvider>,
    pub organizations: Arc<dyn OrganizationsConnector>,
    /// Optional: when set, `Org::resolve_aliases` can look up account aliases
    pub aliases: Option<Arc<dyn AliasSource>>,
}

impl Providers {
    /// SDK-backed providers using the ambient credential chain and region
    pub async fn aws() -> Self {
        let region = RegionProviderChain::default_provider().or_else(FALLBACK_REGION);
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;
        debug!("Loaded ambient AWS config, region: {:?}", config.region());

        Self {
            credentials: Arc::new(StsCredentialProvider::new(&config)),
            organizations: Arc::new(AwsOrganizationsConnector::new(FALLBACK_REGION)),
            aliases: Some(Arc::new(IamAliasSource::new(FALLBACK_REGION))),
        }
    }

    pub fn without_aliases(mut self) -> Self {
        self.aliases = None;
        self
    }
}

/// Determine the organization's master (management) account.
///
/// Looks up the caller's own account, assumes `role_name` there and asks the
/// organizations API. An account outside any organization is an expected
/// outcome, so a failing organization query yields `Ok(None)`. Access denied on
/// the role assumption is still fatal.
pub async fn get_master_account_id(
    providers: &Providers,
    role_name: &str,
) -> Result<Option<String>, CrawlerError> {
    let account_id = providers.credentials.caller_account_id().await?;
    let credentials = providers
        .credentials
        .assume_role(&account_id, role_name)
        .await?;

    let described = match providers.organizations.connect(&credentials).await {
        Ok(client) => client.describe_organization().await,
        Err(e) => Err(e),
    };

    match described {
        Ok(organization) => Ok(Some(organization.master_account_id)),
        Err(e) => {
            warn!(
                "An error occurred while running describe_organization from account {}: {:#}",
                account_id, e
            );
            Ok(None)
        }
    }
}
