//! Tool-call counters
//!
//! # Metrics
//!
//! - `stackrox_mcp_tool_calls_total`: tool invocations, labeled by `tool`
//! - `stackrox_mcp_tool_errors_total`: failed invocations, labeled by
//!   `tool` and `kind` (`invalid_params` or `execution`)
//! - `stackrox_mcp_grpc_retries_total`: retried Central calls, labeled by
//!   `method` (recorded by the retry interceptor)
//!
//! Without the `prometheus` feature the counters go to the no-op recorder.

use metrics::increment_counter;

/// Count one invocation of `tool`
pub fn record_tool_call(tool: &str) {
    increment_counter!("stackrox_mcp_tool_calls_total", "tool" => tool.to_string());
}

/// Count one failed invocation of `tool`
pub fn record_tool_error(tool: &str, kind: &'static str) {
    increment_counter!(
        "stackrox_mcp_tool_errors_total",
        "tool" => tool.to_string(),
        "kind" => kind
    );
}

/// Install the Prometheus exporter when built with the `prometheus` feature
///
/// # Examples
///
/// ```
/// use stackrox_mcp::metrics::init_metrics_exporter;
///
/// // Only does something with the prometheus feature
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        if let Err(e) = PrometheusBuilder::new().install() {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        }
    }
}
