//! Payloads shipped with the crate.
//!
//! Each one builds its own SDK client from the account's resolved credentials
//! and the region it is invoked for.

pub mod iam;
pub mod s3;
pub mod sts;

use crate::app::payload::{FnPayload, PayloadRegistry};
use std::sync::Arc;

pub fn register_builtin(registry: &mut PayloadRegistry) {
    registry.register(Arc::new(
        FnPayload::new("iam.get_account_aliases", iam::get_account_aliases).with_service("iam"),
    ));
    registry.register(Arc::new(
        FnPayload::new("sts.get_caller_identity", sts::get_caller_identity).with_service("sts"),
    ));
    registry.register(Arc::new(
        FnPayload::new("s3.list_buckets", s3::list_buckets).with_service("s3"),
    ));
}
