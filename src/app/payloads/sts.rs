use crate::app::org::model::Account;
use crate::app::payload::PayloadOutput;
use anyhow::{Context, Result};
use aws_sdk_sts::Client as StsClient;
use serde_json::json;

/// Identity the account's credentials resolve to, as seen from `region`
pub async fn get_caller_identity(
    region: String,
    account: Account,
    _args: Vec<String>,
) -> Result<PayloadOutput> {
    let config = account.sdk_config(&region).await?;
    let client = StsClient::new(&config);

    let identity = client
        .get_caller_identity()
        .send()
        .await
        .with_context(|| format!("GetCallerIdentity failed for account {}", account.id))?;

    let mut output = PayloadOutput::new();
    output.insert(
        "CallerIdentity".to_string(),
        json!({
            "Account": identity.account(),
            "Arn": identity.arn(),
            "UserId": identity.user_id(),
        }),
    );
    Ok(output)
}
