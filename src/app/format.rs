//! Rendering execution reports for humans and scripts.

use crate::app::crawler::execution::{CrawlerExecution, ResponseOutcome};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => jsonfmt(value),
            OutputFormat::Yaml => yamlfmt(value),
        }
    }
}

/// Pretty JSON with two-space indentation
pub fn jsonfmt<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn yamlfmt<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

/// One entry per invocation, sorted by account name then region.
///
/// Successful entries carry the payload output under `Response`, failed ones
/// carry the message under `Error`.
pub fn format_responses(execution: &CrawlerExecution) -> Vec<Value> {
    let mut responses: Vec<_> = execution.responses.iter().collect();
    responses.sort_by(|a, b| {
        (a.account_name.as_str(), a.region.as_str()).cmp(&(b.account_name.as_str(), b.region.as_str()))
    });

    responses
        .into_iter()
        .map(|response| {
            let mut entry = json!({
                "Account": response.account_name,
                "AccountId": response.account_id,
                "Region": response.region,
            });
            match &response.outcome {
                ResponseOutcome::Success { payload_output } => {
                    entry["Response"] = json!(payload_output);
                }
                ResponseOutcome::Failure { error, category } => {
                    entry["Error"] = json!(error);
                    entry["ErrorCategory"] = json!(category);
                }
            }
            entry
        })
        .collect()
}
