use std::time::Duration;

use crate::checkers::HostCheckResult;

/// Aggregate view of one probe round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub total_hosts: usize,
    pub successful: usize,
    pub any_down: bool,
    /// Every host failed; never true for an empty group
    pub all_down: bool,
    /// Mean over successful hosts only; zero if none succeeded
    pub avg_response_time: Duration,
}

impl GroupStats {
    pub fn from_results(results: &[HostCheckResult]) -> Self {
        let total_hosts = results.len();
        let mut successful = 0usize;
        let mut total_response = Duration::ZERO;

        for host in results {
            if host.result.success {
                successful += 1;
                total_response += host.result.response_time;
            }
        }

        let avg_response_time = u32::try_from(successful)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| total_response / n)
            .unwrap_or_default();

        Self {
            total_hosts,
            successful,
            any_down: successful < total_hosts,
            all_down: total_hosts > 0 && successful == 0,
            avg_response_time,
        }
    }
}

/// Hosts whose probe failed, in input order.
pub fn failing_hosts(results: &[HostCheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|host| !host.result.success)
        .map(|host| host.host.clone())
        .collect()
}

/// Add one interval while the failure condition holds; reset to zero otherwise.
pub fn update_downtime(current: Duration, interval: Duration, failing: bool) -> Duration {
    if failing {
        current.saturating_add(interval)
    } else {
        Duration::ZERO
    }
}
