//! Per-manager counters rendered in Prometheus text format.
//!
//! Plain atomics, one set per connection; the registry renders them with a
//! `conn` label.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct ManagerStats {
    pub queries_received: Counter,
    pub replies_sent: Counter,
    pub flood_suppressed: Counter,
    pub unconfigured_dropped: Counter,
    pub send_failed: Counter,
    pub requests_sent: Counter,
    pub requests_timed_out: Counter,
}

/// Point-in-time copy of `ManagerStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub queries_received: u64,
    pub replies_sent: u64,
    pub flood_suppressed: u64,
    pub unconfigured_dropped: u64,
    pub send_failed: u64,
    pub requests_sent: u64,
    pub requests_timed_out: u64,
}

impl ManagerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries_received: self.queries_received.get(),
            replies_sent: self.replies_sent.get(),
            flood_suppressed: self.flood_suppressed.get(),
            unconfigured_dropped: self.unconfigured_dropped.get(),
            send_failed: self.send_failed.get(),
            requests_sent: self.requests_sent.get(),
            requests_timed_out: self.requests_timed_out.get(),
        }
    }
}

impl StatsSnapshot {
    fn fields(&self) -> [(&'static str, u64); 7] {
        [
            ("iqversion_queries_received_total", self.queries_received),
            ("iqversion_replies_sent_total", self.replies_sent),
            ("iqversion_flood_suppressed_total", self.flood_suppressed),
            ("iqversion_unconfigured_dropped_total", self.unconfigured_dropped),
            ("iqversion_send_failed_total", self.send_failed),
            ("iqversion_requests_sent_total", self.requests_sent),
            ("iqversion_requests_timed_out_total", self.requests_timed_out),
        ]
    }
}

/// Render labelled snapshots, one `# TYPE` header per metric.
pub fn render(rows: &[(String, StatsSnapshot)]) -> String {
    let mut out = String::new();
    let names = StatsSnapshot::default().fields().map(|(n, _)| n);
    for (i, name) in names.iter().enumerate() {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for (conn, snap) in rows {
            let val = snap.fields()[i].1;
            let _ = writeln!(out, "{}{{conn=\"{}\"}} {}", name, escape_label(conn), val);
        }
    }
    out
}
