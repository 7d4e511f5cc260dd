use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{opts, Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        opts!("samosval_http_requests_total", "HTTP request count"),
        &["method", "path", "status", "outcome"],
    )
    .expect("static metric");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        prometheus::histogram_opts!("samosval_http_request_duration_seconds", "HTTP request latency"),
        &["method", "path"],
    )
    .expect("static metric");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}

/// Collapse id-like path segments so metric label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if uuid::Uuid::parse_str(seg).is_ok() || seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_collapses_ids() {
        assert_eq!(
            normalize_path("/api/operator/deployments/550e8400-e29b-41d4-a716-446655440000/logs"),
            "/api/operator/deployments/:id/logs"
        );
        assert_eq!(normalize_path("/api/admin/users/123/ban"), "/api/admin/users/:id/ban");
        assert_eq!(normalize_path("/api/operator/images"), "/api/operator/images");
    }
}
