//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use regex::Regex;

use super::config::MetricsConfig;

static ID_SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(chains|executions|steps)/[^/]+").expect("valid id segment regex")
});

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the global Prometheus recorder
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("chain_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!(path = %config.path, "Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Prometheus metrics");
            None
        }
    }
}

pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    if status >= 500 {
        counter!("http_server_errors_total", &labels).increment(1);
    }
}

/// Count an execution reaching a terminal status
pub fn record_execution_finished(status: &str) {
    counter!("chain_executions_total", "status" => status.to_string()).increment(1);
}

/// Count one step invocation and its wall time
pub fn record_step_invocation(outcome: &str, duration: Duration) {
    counter!("chain_step_invocations_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("chain_step_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());
}

/// Collapse ids in URL paths so labels stay low-cardinality
fn sanitize_path(path: &str) -> String {
    let path = ID_SEGMENT_REGEX.replace_all(path, "/$1/{id}");

    if path.len() > 64 {
        path.chars().take(64).collect()
    } else {
        path.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_chain_id() {
        assert_eq!(sanitize_path("/v1/chains/chain-42"), "/v1/chains/{id}");
        assert_eq!(
            sanitize_path("/v1/chains/checkout/executions"),
            "/v1/chains/{id}/executions"
        );
    }

    #[test]
    fn test_sanitize_path_nested_ids() {
        assert_eq!(
            sanitize_path("/v1/executions/exec-1/steps/charge/result"),
            "/v1/executions/{id}/steps/{id}/result"
        );
    }

    #[test]
    fn test_sanitize_path_no_id() {
        assert_eq!(sanitize_path("/health"), "/health");
        assert_eq!(sanitize_path("/v1/chains"), "/v1/chains");
    }

    #[test]
    fn test_sanitize_path_truncates_long_paths() {
        let path = "/very/long/path/that/exceeds/the/maximum/allowed/length/for/metric/labels";
        assert!(sanitize_path(path).len() <= 64);
    }
}
