//! Region lists for the crawl matrix.
//!
//! Regional services are crawled in every region of the standard partition.
//! Global services (IAM, Organizations, Route 53, ...) return the same data
//! wherever they are called from, so they are crawled once per account from the
//! designated global query region.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Region that serves the global endpoints
pub const GLOBAL_QUERY_REGION: &str = "us-east-1";

/// Regions of the standard `aws` partition
pub static AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ca-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
];

/// Registry of AWS services whose endpoint is global
pub struct GlobalServiceRegistry {
    global_services: HashSet<&'static str>,
}

impl Default for GlobalServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalServiceRegistry {
    pub fn new() -> Self {
        let global_services = [
            "iam",
            "organizations",
            "route53",
            "route53domains",
            "cloudfront",
            "shield",
            "globalaccelerator",
            "sts-global",
            "waf",
            "budgets",
            "ce",
            "support",
        ]
        .into_iter()
        .collect();

        Self { global_services }
    }

    /// Check if a service (SDK/CLI service name, case-insensitive) is global
    pub fn is_global(&self, service: &str) -> bool {
        self.global_services
            .contains(service.trim().to_ascii_lowercase().as_str())
    }

    /// Get the query region for global services
    pub fn get_query_region(&self) -> &'static str {
        GLOBAL_QUERY_REGION
    }
}

static GLOBAL_SERVICES: Lazy<GlobalServiceRegistry> = Lazy::new(GlobalServiceRegistry::new);

/// Convenience function to check if a service is global
pub fn is_global_service(service: &str) -> bool {
    GLOBAL_SERVICES.is_global(service)
}

/// Every region of the standard partition
pub fn all_regions() -> Vec<String> {
    AWS_REGIONS.iter().map(|r| r.to_string()).collect()
}

/// Regions to crawl for payloads that call `service`.
///
/// A global service yields only the global query region so each account is
/// visited once.
pub fn regions_for_service(service: &str) -> Vec<String> {
    if is_global_service(service) {
        vec![GLOBAL_SERVICES.get_query_region().to_string()]
    } else {
        all_regions()
    }
}

/// Split a comma separated region list, dropping blanks and duplicates
pub fn parse_region_list(list: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    list.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .filter(|r| seen.insert(r.to_string()))
        .map(str::to_string)
        .collect()
}

/// True if `region` belongs to the standard partition list
pub fn is_known_region(region: &str) -> bool {
    AWS_REGIONS.contains(&region)
}
