//! Prometheus-compatible counters for the protocol endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// HTTP requests served, any route.
    http_requests_total: AtomicU64,
    /// Responses with a 4xx or 5xx status.
    http_errors_total: AtomicU64,
    /// JSON-RPC bodies handled.
    rpc_requests_total: AtomicU64,
    /// JSON-RPC responses carrying an `error` member.
    rpc_errors_total: AtomicU64,
    tool_calls_total: AtomicU64,
    /// Tool calls that failed or returned `isError`.
    tool_errors_total: AtomicU64,
    rate_limit_rejections_total: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                rpc_requests_total: AtomicU64::new(0),
                rpc_errors_total: AtomicU64::new(0),
                tool_calls_total: AtomicU64::new(0),
                tool_errors_total: AtomicU64::new(0),
                rate_limit_rejections_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rpc_requests(&self) {
        self.inner.rpc_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rpc_errors(&self) {
        self.inner.rpc_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.inner.tool_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_errors(&self) {
        self.inner.tool_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limit_rejections(&self) {
        self.inner
            .rate_limit_rejections_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let m = &self.inner;
        format!(
            r#"# HELP playbook_uptime_seconds Time since the server started.
# TYPE playbook_uptime_seconds gauge
playbook_uptime_seconds {}

# HELP playbook_http_requests_total Total HTTP requests served.
# TYPE playbook_http_requests_total counter
playbook_http_requests_total {}

# HELP playbook_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE playbook_http_errors_total counter
playbook_http_errors_total {}

# HELP playbook_rpc_requests_total Total JSON-RPC requests handled.
# TYPE playbook_rpc_requests_total counter
playbook_rpc_requests_total {}

# HELP playbook_rpc_errors_total Total JSON-RPC error responses.
# TYPE playbook_rpc_errors_total counter
playbook_rpc_errors_total {}

# HELP playbook_tool_calls_total Total tool calls executed.
# TYPE playbook_tool_calls_total counter
playbook_tool_calls_total {}

# HELP playbook_tool_errors_total Total tool execution errors.
# TYPE playbook_tool_errors_total counter
playbook_tool_errors_total {}

# HELP playbook_rate_limit_rejections_total Total rate limit rejections (429).
# TYPE playbook_rate_limit_rejections_total counter
playbook_rate_limit_rejections_total {}
"#,
            self.uptime_secs(),
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.rpc_requests_total.load(Ordering::Relaxed),
            m.rpc_errors_total.load(Ordering::Relaxed),
            m.tool_calls_total.load(Ordering::Relaxed),
            m.tool_errors_total.load(Ordering::Relaxed),
            m.rate_limit_rejections_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counter_increments() {
        let m = Metrics::new();
        m.inc_http_requests();
        m.inc_http_requests();
        m.inc_tool_calls();
        m.inc_tool_errors();
        let output = m.render_prometheus();
        assert!(output.contains("playbook_http_requests_total 2"));
        assert!(output.contains("playbook_tool_calls_total 1"));
        assert!(output.contains("playbook_tool_errors_total 1"));
        assert!(output.contains("playbook_rpc_errors_total 0"));
    }

    #[test]
    fn test_metrics_prometheus_format() {
        let output = Metrics::new().render_prometheus();
        assert!(output.contains("# HELP playbook_uptime_seconds"));
        assert!(output.contains("# TYPE playbook_uptime_seconds gauge"));
        assert!(output.contains("# TYPE playbook_rate_limit_rejections_total counter"));
    }
}
