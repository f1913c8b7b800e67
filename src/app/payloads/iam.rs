use crate::app::org::model::Account;
use crate::app::payload::PayloadOutput;
use anyhow::{Context, Result};
use aws_sdk_iam as iam;
use serde_json::json;

/// `{"AccountAliases": [...]}` for the account
pub async fn get_account_aliases(
    region: String,
    account: Account,
    _args: Vec<String>,
) -> Result<PayloadOutput> {
    let config = account.sdk_config(&region).await?;
    let client = iam::Client::new(&config);

    let response = client
        .list_account_aliases()
        .send()
        .await
        .with_context(|| format!("ListAccountAliases failed for account {}", account.id))?;

    let mut output = PayloadOutput::new();
    output.insert(
        "AccountAliases".to_string(),
        json!(response.account_aliases()),
    );
    Ok(output)
}
