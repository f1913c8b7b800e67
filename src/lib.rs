//! orgcrawler - run one operation across every account and region of an AWS organization
//!
//! The crate discovers the accounts and organizational units of an AWS
//! organization, caches that tree on disk, assumes a role in each member
//! account and fans a payload out across the account × region matrix,
//! collecting every result (or per-invocation failure) into one report.
//!
//! # Architecture Overview
//!
//! - **Organization** ([`app::org`]): arena-style tree of accounts and OUs, a
//!   cache-first loader and lookup/listing helpers
//! - **Credentials** ([`app::credentials`]): STS role assumption; access denied
//!   is fatal for the whole run
//! - **Crawler** ([`app::crawler`]): two fully separated phases, credential
//!   resolution and payload execution, both bounded by [`app::task_runner`]
//! - **Payloads** ([`app::payload`]): named async operations resolved through a
//!   registry, never loaded dynamically
//!
//! # Getting Started
//!
//! ```no_run
//! use orgcrawler::app::crawler::{Crawler, CrawlerOptions};
//! use orgcrawler::app::credentials::{get_master_account_id, Providers};
//! use orgcrawler::app::org::{cache::FileCacheStore, Org};
//! use orgcrawler::app::payload::{PayloadDescriptor, PayloadRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let providers = Providers::aws().await;
//! let master = get_master_account_id(&providers, "OrgMasterRole")
//!     .await?
//!     .ok_or_else(|| anyhow::anyhow!("not in an organization"))?;
//!
//! let mut org = Org::new(
//!     &master,
//!     "OrgMasterRole",
//!     providers,
//!     Arc::new(FileCacheStore::default_location()?),
//! );
//! org.load().await?;
//!
//! let mut crawler = Crawler::new(org, CrawlerOptions::default()).await?;
//! crawler.load_account_credentials().await?;
//! let payload = PayloadRegistry::builtin()
//!     .resolve(&PayloadDescriptor::by_reference("iam.get_account_aliases"))?;
//! let execution = crawler.execute(payload, &[]).await?;
//! println!("{} failed", execution.failed_count());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;
