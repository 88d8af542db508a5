// src/monitor/metrics.rs

use super::*;

pub struct Metrics {
    pub connected_clients: AtomicU64,
    pub total_connections: AtomicU64,
    pub command_count: AtomicU64,
    pub error_count: AtomicU64,
    pub command_stats: DashMap<&'static str, u64>,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            connected_clients: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            command_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            command_stats: DashMap::new(),
            started: Instant::now(),
        }
    }

    /// `name` is the canonical command name; `failed` marks an error reply
    pub fn record_command(&self, name: &'static str, failed: bool) {
        self.command_count.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        *self.command_stats.entry(name).or_insert(0) += 1;
    }

    /// Requests rejected before a command could be identified
    pub fn record_rejected(&self) {
        self.command_count.fetch_add(1, Ordering::Relaxed);
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_connected(&self) {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        // never wraps below zero
        let _ = self
            .connected_clients
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Per-command counts sorted by name
    pub fn command_counts(&self) -> Vec<(&'static str, u64)> {
        let mut counts: Vec<_> = self.command_stats.iter().map(|e| (*e.key(), *e.value())).collect();
        counts.sort_unstable();
        counts
    }

    pub fn to_prometheus(&self, ks: &Keyspace) -> String {
        let mut output = String::new();

        let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
            output.push_str(&format!("# HELP crab_kv_{} {}\n", name, help));
            output.push_str(&format!("# TYPE crab_kv_{} {}\n", name, kind));
            output.push_str(&format!("crab_kv_{} {}\n", name, value));
        };

        metric(
            "connected_clients",
            "gauge",
            "Current number of client connections",
            self.connected_clients.load(Ordering::Relaxed),
        );
        metric(
            "total_connections",
            "counter",
            "Total connections since startup",
            self.total_connections.load(Ordering::Relaxed),
        );
        metric(
            "command_count",
            "counter",
            "Total commands processed",
            self.command_count.load(Ordering::Relaxed),
        );
        metric(
            "error_count",
            "counter",
            "Commands that produced an error reply",
            self.error_count.load(Ordering::Relaxed),
        );
        metric("keys", "gauge", "Live keys in the key space", ks.len() as u64);
        metric(
            "expired_keys",
            "counter",
            "Keys reclaimed by lazy or active expiry",
            ks.expired_keys(),
        );

        output.push_str("# HELP crab_kv_command_stats Command statistics\n");
        output.push_str("# TYPE crab_kv_command_stats counter\n");
        for (name, count) in self.command_counts() {
            output.push_str(&format!(
                "crab_kv_command_stats{{command=\"{}\"}} {}\n",
                name.to_ascii_lowercase(),
                count
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    #[test]
    fn test_record_and_export() {
        let metrics = Metrics::new();
        metrics.record_command("GET", false);
        metrics.record_command("GET", false);
        metrics.record_command("SET", true);
        metrics.record_rejected();
        metrics.client_connected();
        metrics.client_connected();
        metrics.client_disconnected();

        assert_eq!(metrics.command_count.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.error_count.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.command_counts(), vec![("GET", 2), ("SET", 1)]);

        let ks = Keyspace::new(&StoreConfig::default());
        let text = metrics.to_prometheus(&ks);
        assert!(text.contains("crab_kv_connected_clients 1\n"));
        assert!(text.contains("crab_kv_total_connections 2\n"));
        assert!(text.contains("crab_kv_command_stats{command=\"get\"} 2\n"));
        assert!(text.contains("crab_kv_keys 0\n"));
    }

    #[test]
    fn test_disconnect_saturates() {
        let metrics = Metrics::new();
        metrics.client_disconnected();
        assert_eq!(metrics.connected_clients.load(Ordering::Relaxed), 0);
    }
}
