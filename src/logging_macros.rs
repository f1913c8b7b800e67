#![warn(clippy::all, rust_2018_idioms)]

/// Tracing macros that prefix every message with `[file:module:line]`.
///
/// Use these for operational events where the call site matters when reading
/// `orgcrawler.log` after a crawl (credential phases, cache decisions, fan-out
/// summaries). Plain `tracing::debug!` is fine for everything else.
#[macro_export]
macro_rules! trace_debug {
    ($($arg:tt)*) => {
        tracing::debug!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_info {
    ($($arg:tt)*) => {
        tracing::info!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_warn {
    ($($arg:tt)*) => {
        tracing::warn!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*));
    };
}

#[macro_export]
macro_rules! trace_error {
    ($($arg:tt)*) => {
        tracing::error!("[{}:{}:{}] {}", file!(), module_path!(), line!(), format!($($arg)*));
    };
}

/*
Log level guidelines:

DEBUG: per-account and per-(account, region) progress, cache hit/miss details,
       SDK client construction.
INFO:  phase boundaries (organization loaded, credentials resolved, execution
       finished) and summary counts.
WARN:  recoverable conditions: cache write failures, alias lookups that failed,
       payload invocations that failed for one (account, region).
ERROR: conditions that end the run (access denied, credential phase failure).

Never log credential material. AccountCredentials implements Debug with the
secret and session token redacted, so `{:?}` on it is safe.
*/
