//! Minimal metrics registry for the policy engine.
//!
//! Counter/gauge types with dynamic labels backed by `DashMap`. Labels are
//! flattened into sorted key vectors to keep deterministic ordering.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut key: Vec<(String, String)> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn label_str(key: &[(String, String)]) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| (label_str(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            if labels.is_empty() {
                let _ = writeln!(out, "{} {}", name, val);
            } else {
                let _ = writeln!(out, "{}{{{}}} {}", name, labels, val);
            }
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<Vec<(String, String)>, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) { self.add(labels, 1); }
    pub fn dec(&self, labels: &[(&str, &str)]) { self.add(labels, -1); }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self
            .map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} gauge", name);
        let mut rows: Vec<(String, i64)> = self
            .map
            .iter()
            .map(|r| (label_str(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            if labels.is_empty() {
                let _ = writeln!(out, "{} {}", name, val);
            } else {
                let _ = writeln!(out, "{}{{{}}} {}", name, labels, val);
            }
        }
    }
}

/// Counters for every decision the engine takes.
#[derive(Default)]
pub struct PolicyMetrics {
    /// `op` = subscribe|unsubscribe|publish, `outcome` = admitted|blocked|invalid|overflow.
    pub decisions: CounterVec,
    pub messages_blocked: CounterVec,
    pub attached_connections: GaugeVec,
}

impl PolicyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render all registered metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.decisions.render("mqguard_policy_decisions_total", &mut out);
        self.messages_blocked.render("mqguard_messages_blocked_total", &mut out);
        self.attached_connections.render("mqguard_attached_connections", &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_order_independent() {
        let m = PolicyMetrics::new();
        m.decisions.inc(&[("op", "publish"), ("outcome", "blocked")]);
        m.decisions.inc(&[("outcome", "blocked"), ("op", "publish")]);
        assert_eq!(m.decisions.get(&[("op", "publish"), ("outcome", "blocked")]), 2);

        let text = m.render();
        assert!(text.contains("mqguard_policy_decisions_total{op=\"publish\",outcome=\"blocked\"} 2"));
    }

    #[test]
    fn gauge_tracks_attach_detach() {
        let m = PolicyMetrics::new();
        m.attached_connections.inc(&[]);
        m.attached_connections.inc(&[]);
        m.attached_connections.dec(&[]);
        assert_eq!(m.attached_connections.get(&[]), 1);
        assert!(m.render().contains("mqguard_attached_connections 1"));
    }
}
