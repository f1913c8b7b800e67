//! Core modules of the organization crawler.
//!
//! # Module Organization
//!
//! ## AWS Integration
//! - [`credentials`] - Role assumption and the injected provider bundle
//! - [`organizations`] - Organizations and IAM API seams with SDK implementations
//! - [`sdk_errors`] - Categorization of SDK error messages
//! - [`regions`] - Region lists and global-service handling
//!
//! ## Organization Model
//! - [`org`] - The organization façade, its tree model and cache store
//!
//! ## Crawling
//! - [`task_runner`] - Bounded-parallel map shared by every fan-out
//! - [`crawler`] - Credential phase, payload execution and result aggregation
//! - [`payload`] - Payload trait, descriptors and registry
//! - [`payloads`] - Built-in payloads
//!
//! ## Front End Support
//! - [`config`] - Optional `config.toml`
//! - [`format`] - JSON/YAML rendering of execution reports
//! - [`error`] - Typed error taxonomy
//!
//! # Architecture
//!
//! [`org::Org`] is loaded first (from cache or live), then handed to a
//! [`crawler::Crawler`], which resolves per-account credentials and runs a
//! [`payload::Payload`] across the account × region matrix. External services
//! are reached only through [`credentials::Providers`], so the whole pipeline
//! runs against in-memory fakes in tests.

pub mod config;
pub mod crawler;
pub mod credentials;
pub mod error;
pub mod format;
pub mod org;
pub mod organizations;
pub mod payload;
pub mod payloads;
pub mod regions;
pub mod sdk_errors;
pub mod task_runner;
