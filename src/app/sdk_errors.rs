//! Classification of AWS SDK failures seen by payload invocations.
//!
//! Payloads return `anyhow::Error`, which usually wraps an SDK error. The crawler
//! never retries on its own (the SDK already does), but every failed
//! (account, region) entry carries a category label so a report reader can tell
//! a throttled call from a missing permission without parsing the message.

use serde::{Deserialize, Serialize};

/// Error codes that mean "the principal is not allowed to do this".
const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnauthorizedAccess",
    "AuthFailure",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

/// Categorized failure of a single SDK call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request was throttled due to rate limiting
    Throttled { error_code: String },
    /// Request timed out
    Timeout,
    /// Network connectivity issues
    Network,
    /// AWS service temporarily unavailable
    Unavailable,
    /// Anything the SDK will not retry (permissions, validation, missing resources)
    NonRetryable {
        code: String,
        is_permission_error: bool,
    },
}

impl ErrorCategory {
    /// Returns true if the SDK would have treated this as transient
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::NonRetryable { .. })
    }

    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            ErrorCategory::NonRetryable {
                is_permission_error: true,
                ..
            }
        )
    }

    /// Short label used in execution reports
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttled { .. } => "throttled",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::NonRetryable {
                is_permission_error: true,
                ..
            } => "permission",
            ErrorCategory::NonRetryable { .. } => "error",
        }
    }
}

/// Categorize an `anyhow::Error` coming back from a payload.
///
/// The `Debug` rendering of an SDK error carries the service error code while
/// `Display` often only says "service error", so both are inspected.
pub fn categorize_error(error: &anyhow::Error) -> ErrorCategory {
    let display = format!("{:#}", error);
    let detail = if display.contains("service error") {
        format!("{} {:?}", display, error)
    } else {
        display
    };
    categorize_error_string(&detail)
}

/// Categorize an error based on its string representation
pub fn categorize_error_string(error_str: &str) -> ErrorCategory {
    if error_str.contains("ThrottlingException")
        || error_str.contains("Throttling")
        || error_str.contains("TooManyRequestsException")
        || error_str.contains("RequestLimitExceeded")
        || error_str.contains("RateExceeded")
    {
        let error_code = extract_error_code(error_str).unwrap_or_else(|| "Throttling".to_string());
        return ErrorCategory::Throttled { error_code };
    }

    if error_str.contains("TimeoutError")
        || error_str.contains("timed out")
        || error_str.contains("deadline exceeded")
    {
        return ErrorCategory::Timeout;
    }

    if error_str.contains("DispatchFailure")
        || error_str.contains("dispatch failure")
        || error_str.contains("connection")
        || error_str.contains("Connection")
        || error_str.contains("DNS")
    {
        return ErrorCategory::Network;
    }

    if error_str.contains("ServiceUnavailable")
        || error_str.contains("InternalServerError")
        || error_str.contains("InternalFailure")
        || error_str.contains("InternalError")
    {
        return ErrorCategory::Unavailable;
    }

    let code = extract_error_code(error_str);
    let is_permission_error = PERMISSION_CODES.iter().any(|c| error_str.contains(c));
    let code = code.unwrap_or_else(|| {
        if is_permission_error {
            "AccessDenied".to_string()
        } else {
            "Error".to_string()
        }
    });

    ErrorCategory::NonRetryable {
        code,
        is_permission_error,
    }
}

/// Extract an AWS error code from an error message if present.
///
/// Handles `ErrorName: message` and the `code: Some("ErrorName")` shape of SDK
/// debug output.
fn extract_error_code(error_str: &str) -> Option<String> {
    if let Some(start) = error_str.find("code: Some(\"") {
        let after = &error_str[start + "code: Some(\"".len()..];
        if let Some(end) = after.find('"') {
            let code = &after[..end];
            if !code.is_empty() && code.len() < 64 {
                return Some(code.to_string());
            }
        }
    }

    if let Some(pos) = error_str.find(':') {
        let prefix = error_str[..pos].trim();
        let looks_like_code = !prefix.is_empty()
            && !prefix.contains(' ')
            && prefix.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if looks_like_code && prefix.len() < 64 {
            return Some(prefix.rsplit("::").next().unwrap_or(prefix).to_string());
        }
    }

    None
}
