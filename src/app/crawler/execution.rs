//! Results of one payload execution across the account × region matrix.

use crate::app::payload::PayloadOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How one (account, region) invocation ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseOutcome {
    Success {
        payload_output: PayloadOutput,
    },
    Failure {
        error: String,
        /// `throttled`, `permission`, `panic`, ...
        category: String,
    },
}

/// Outcome of one invocation with the context needed to attribute it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadResponse {
    pub account_id: String,
    pub account_name: String,
    pub region: String,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl PayloadResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Success { .. })
    }

    pub fn payload_output(&self) -> Option<&PayloadOutput> {
        match &self.outcome {
            ResponseOutcome::Success { payload_output } => Some(payload_output),
            ResponseOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ResponseOutcome::Success { .. } => None,
            ResponseOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// One named value produced by one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedResult<'a> {
    pub account_id: &'a str,
    pub account_name: &'a str,
    pub region: &'a str,
    pub value: &'a serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerExecution {
    pub payload_name: String,
    pub args: Vec<String>,
    /// One entry per (account, region), in completion order
    pub responses: Vec<PayloadResponse>,
    pub elapsed: Duration,
}

impl CrawlerExecution {
    pub fn failed_count(&self) -> usize {
        self.responses.iter().filter(|r| !r.is_success()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.responses.len() - self.failed_count()
    }

    /// Successful values grouped by the name the payload gave them
    pub fn results_by_name(&self) -> BTreeMap<&str, Vec<NamedResult<'_>>> {
        let mut grouped: BTreeMap<&str, Vec<NamedResult<'_>>> = BTreeMap::new();
        for response in &self.responses {
            let Some(output) = response.payload_output() else {
                continue;
            };
            for (name, value) in output {
                grouped.entry(name.as_str()).or_default().push(NamedResult {
                    account_id: &response.account_id,
                    account_name: &response.account_name,
                    region: &response.region,
                    value,
                });
            }
        }
        grouped
    }

    pub fn responses_for_account(&self, account_id: &str) -> Vec<&PayloadResponse> {
        self.responses
            .iter()
            .filter(|r| r.account_id == account_id)
            .collect()
    }
}
