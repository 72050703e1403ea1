//! Authorization metrics recorded through the `metrics` facade.

use metrics::{counter, histogram};
use std::time::Instant;

use super::AuthzError;

pub fn record_token_verification(result: Result<(), &AuthzError>) {
    let outcome = match result {
        Ok(()) => "verified",
        Err(err) => err.reason(),
    };
    counter!("authz_token_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_decision(component: &'static str, action: &'static str, outcome: &'static str) {
    counter!(
        "authz_decisions_total",
        "component" => component,
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_cache(cache: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("authz_registry_cache_total", "cache" => cache, "result" => result).increment(1);
}

/// Times a storage query; the duration is recorded on drop.
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn start(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        histogram!("authz_db_query_duration_seconds", "query" => self.query)
            .record(self.start.elapsed().as_secs_f64());
    }
}
