use crate::app::org::model::Account;
use crate::app::payload::PayloadOutput;
use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use aws_smithy_types::date_time::Format;
use serde_json::json;

/// Buckets homed in `region`.
///
/// Optional first argument: a bucket name prefix.
pub async fn list_buckets(
    region: String,
    account: Account,
    args: Vec<String>,
) -> Result<PayloadOutput> {
    let config = account.sdk_config(&region).await?;
    let client = s3::Client::new(&config);

    let mut request = client.list_buckets().bucket_region(&region);
    if let Some(prefix) = args.first() {
        request = request.prefix(prefix);
    }

    let response = request.send().await.with_context(|| {
        format!(
            "ListBuckets failed for account {} in region {}",
            account.id, region
        )
    })?;

    let buckets: Vec<serde_json::Value> = response
        .buckets
        .unwrap_or_default()
        .into_iter()
        .map(|bucket| {
            json!({
                "Name": bucket.name,
                "CreationDate": bucket
                    .creation_date
                    .and_then(|d| d.fmt(Format::DateTime).ok()),
            })
        })
        .collect();

    let mut output = PayloadOutput::new();
    output.insert("Buckets".to_string(), json!(buckets));
    Ok(output)
}
