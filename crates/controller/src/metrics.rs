//! Sync counters and their plain-text exposition.

use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Utc;

use crate::haproxy::EndpointStats;

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub syncs_total: u64,
    pub errors_total: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Counters shared by the controller loop and the ops server. Never reset.
#[derive(Debug, Default)]
pub struct SyncStats {
    inner: Mutex<StatsSnapshot>,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync(&self, at: DateTime<Utc>) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.syncs_total += 1;
        stats.last_sync = Some(at);
    }

    pub fn record_errors(&self, count: u64) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.errors_total += count;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Render counters and per-endpoint gauges in Prometheus text format.
pub fn render_metrics(stats: &StatsSnapshot, endpoints: &[EndpointStats]) -> String {
    let last_sync = stats.last_sync.map(|t| t.timestamp()).unwrap_or(0);
    let backends = gauge_lines("pfsense_haproxy_backends", endpoints, |e| e.backends);
    let frontends = gauge_lines("pfsense_haproxy_frontends", endpoints, |e| e.frontends);

    format!(
        "# HELP pfsense_controller_syncs_total Full synchronisation cycles completed\n\
         # TYPE pfsense_controller_syncs_total counter\n\
         pfsense_controller_syncs_total {syncs}\n\
         # HELP pfsense_controller_errors_total Failed container or cycle syncs\n\
         # TYPE pfsense_controller_errors_total counter\n\
         pfsense_controller_errors_total {errors}\n\
         # HELP pfsense_controller_last_sync_timestamp Unix time of the last full sync\n\
         # TYPE pfsense_controller_last_sync_timestamp gauge\n\
         pfsense_controller_last_sync_timestamp {last_sync}\n\
         # HELP pfsense_haproxy_backends HAProxy backends on the endpoint\n\
         # TYPE pfsense_haproxy_backends gauge\n\
         {backends}\
         # HELP pfsense_haproxy_frontends HAProxy frontends on the endpoint\n\
         # TYPE pfsense_haproxy_frontends gauge\n\
         {frontends}",
        syncs = stats.syncs_total,
        errors = stats.errors_total,
    )
}

/// One `name{endpoint="..."} value` line per endpoint that reported a count.
fn gauge_lines(
    name: &str,
    endpoints: &[EndpointStats],
    count: impl Fn(&EndpointStats) -> Option<usize>,
) -> String {
    endpoints
        .iter()
        .filter_map(|endpoint| {
            count(endpoint)
                .map(|value| format!("{name}{{endpoint=\"{}\"}} {value}\n", endpoint.endpoint))
        })
        .collect()
}
