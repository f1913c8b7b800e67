//! Payloads: the unit of work the crawler fans out.
//!
//! A payload is a named async function of `(region, account, args)` that
//! returns one or more named JSON values. The crawler never loads code
//! dynamically; it resolves a [`PayloadDescriptor`] through a
//! [`PayloadRegistry`]:
//!
//! * `ByReference { name }` picks a registered payload by its dotted name.
//! * `Inline(PayloadDefinition)` comes from a YAML payload file and binds a
//!   registered payload (`uses`) to leading arguments under a new name.

use crate::app::error::CrawlerError;
use crate::app::org::model::Account;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Named results of one invocation, e.g. `{"AccountAliases": [...]}`
pub type PayloadOutput = BTreeMap<String, serde_json::Value>;

#[async_trait]
pub trait Payload: Send + Sync {
    /// Dotted name the results are grouped under
    fn name(&self) -> &str;

    /// Service the payload calls, used to pick a default region list
    fn service(&self) -> Option<&str> {
        None
    }

    async fn run(&self, region: &str, account: &Account, args: &[String]) -> Result<PayloadOutput>;
}

/// [`Payload`] over an async closure.
///
/// The closure receives owned copies so the returned future can be `'static`.
pub struct FnPayload<F> {
    name: String,
    service: Option<String>,
    f: F,
}

impl<F> FnPayload<F> {
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            service: None,
            f,
        }
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }
}

#[async_trait]
impl<F, Fut> Payload for FnPayload<F>
where
    F: Fn(String, Account, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PayloadOutput>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    async fn run(&self, region: &str, account: &Account, args: &[String]) -> Result<PayloadOutput> {
        (self.f)(region.to_string(), account.clone(), args.to_vec()).await
    }
}

/// A registered payload with preset leading arguments, run under its own name
pub struct BoundPayload {
    name: String,
    service: Option<String>,
    inner: Arc<dyn Payload>,
    args: Vec<String>,
}

#[async_trait]
impl Payload for BoundPayload {
    fn name(&self) -> &str {
        &self.name
    }

    fn service(&self) -> Option<&str> {
        self.service.as_deref().or_else(|| self.inner.service())
    }

    async fn run(&self, region: &str, account: &Account, args: &[String]) -> Result<PayloadOutput> {
        let mut all_args = self.args.clone();
        all_args.extend_from_slice(args);
        self.inner.run(region, account, &all_args).await
    }
}

/// Payload definition as written in a payload file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadDefinition {
    pub name: String,
    /// Dotted name of the registered payload to run
    pub uses: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadDescriptor {
    ByReference { name: String },
    Inline(PayloadDefinition),
}

impl PayloadDescriptor {
    pub fn by_reference(name: &str) -> Self {
        PayloadDescriptor::ByReference {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PayloadDescriptor::ByReference { name } => name,
            PayloadDescriptor::Inline(definition) => &definition.name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PayloadFile {
    #[serde(default)]
    payloads: Vec<PayloadDefinition>,
}

/// Read the definition called `name` from a YAML payload file:
///
/// ```yaml
/// payloads:
///   - name: prod_aliases
///     uses: iam.get_account_aliases
///     service: iam
/// ```
pub fn load_payload_file(path: &Path, name: &str) -> Result<PayloadDescriptor, CrawlerError> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload file {:?}", path))?;
    let file: PayloadFile = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse payload file {:?}", path))?;

    file.payloads
        .into_iter()
        .find(|definition| definition.name == name)
        .map(PayloadDescriptor::Inline)
        .ok_or_else(|| CrawlerError::UnknownPayload(format!("{} (in {})", name, path.display())))
}

/// Payloads by dotted name
#[derive(Default, Clone)]
pub struct PayloadRegistry {
    payloads: HashMap<String, Arc<dyn Payload>>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the payloads shipped with the crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::app::payloads::register_builtin(&mut registry);
        registry
    }

    pub fn register(&mut self, payload: Arc<dyn Payload>) {
        self.payloads.insert(payload.name().to_string(), payload);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Payload>> {
        self.payloads.get(name).cloned()
    }

    /// Sorted names of every registered payload
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.payloads.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolve(&self, descriptor: &PayloadDescriptor) -> Result<Arc<dyn Payload>, CrawlerError> {
        match descriptor {
            PayloadDescriptor::ByReference { name } => self
                .get(name)
                .ok_or_else(|| CrawlerError::UnknownPayload(name.clone())),
            PayloadDescriptor::Inline(definition) => {
                let inner = self
                    .get(&definition.uses)
                    .ok_or_else(|| CrawlerError::UnknownPayload(definition.uses.clone()))?;
                Ok(Arc::new(BoundPayload {
                    name: definition.name.clone(),
                    service: definition.service.clone(),
                    inner,
                    args: definition.args.clone(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn account() -> Account {
        Account {
            organization_id: "o-exampleorg".to_string(),
            master_account_id: "123456789012".to_string(),
            name: "account01".to_string(),
            id: "210987654321".to_string(),
            parent_id: "r-exam".to_string(),
            email: "account01@example.com".to_string(),
            aliases: vec![],
            credentials: None,
        }
    }

    fn echo() -> Arc<dyn Payload> {
        Arc::new(
            FnPayload::new("test.echo", |region: String, account: Account, args: Vec<String>| async move {
                let mut output = PayloadOutput::new();
                output.insert(
                    "Echo".to_string(),
                    json!({ "region": region, "account": account.name, "args": args }),
                );
                Ok::<_, anyhow::Error>(output)
            })
            .with_service("ec2"),
        )
    }

    #[tokio::test]
    async fn test_resolve_by_reference() {
        let mut registry = PayloadRegistry::new();
        registry.register(echo());

        let payload = registry
            .resolve(&PayloadDescriptor::by_reference("test.echo"))
            .unwrap();
        assert_eq!(payload.name(), "test.echo");
        assert_eq!(payload.service(), Some("ec2"));

        let output = payload
            .run("us-west-2", &account(), &["x".to_string()])
            .await
            .unwrap();
        assert_eq!(
            output["Echo"],
            json!({ "region": "us-west-2", "account": "account01", "args": ["x"] })
        );

        let missing = registry.resolve(&PayloadDescriptor::by_reference("nope"));
        assert!(matches!(missing, Err(CrawlerError::UnknownPayload(ref n)) if n == "nope"));
    }

    #[tokio::test]
    async fn test_inline_definition_binds_leading_args() {
        let mut registry = PayloadRegistry::new();
        registry.register(echo());

        let descriptor = PayloadDescriptor::Inline(PayloadDefinition {
            name: "bound_echo".to_string(),
            uses: "test.echo".to_string(),
            args: vec!["preset".to_string()],
            service: Some("iam".to_string()),
            description: None,
        });
        let payload = registry.resolve(&descriptor).unwrap();
        assert_eq!(payload.name(), "bound_echo");
        assert_eq!(payload.service(), Some("iam"));

        let output = payload
            .run("us-east-1", &account(), &["extra".to_string()])
            .await
            .unwrap();
        assert_eq!(output["Echo"]["args"], json!(["preset", "extra"]));
    }

    #[test]
    fn test_load_payload_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "payloads:\n  - name: prod_aliases\n    uses: iam.get_account_aliases\n    service: iam\n"
        )
        .unwrap();

        let descriptor = load_payload_file(file.path(), "prod_aliases").unwrap();
        assert_eq!(descriptor.name(), "prod_aliases");
        match descriptor {
            PayloadDescriptor::Inline(definition) => {
                assert_eq!(definition.uses, "iam.get_account_aliases");
                assert!(definition.args.is_empty());
            }
            other => panic!("unexpected descriptor {:?}", other),
        }

        assert!(matches!(
            load_payload_file(file.path(), "missing"),
            Err(CrawlerError::UnknownPayload(_))
        ));
    }

    #[test]
    fn test_descriptor_serialization() {
        let yaml = serde_yaml::to_string(&PayloadDescriptor::by_reference("s3.list_buckets")).unwrap();
        assert!(yaml.contains("kind: by_reference"));
        let back: PayloadDescriptor = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, PayloadDescriptor::by_reference("s3.list_buckets"));
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(
            PayloadRegistry::builtin().names(),
            vec![
                "iam.get_account_aliases".to_string(),
                "s3.list_buckets".to_string(),
                "sts.get_caller_identity".to_string(),
            ]
        );
    }
}
