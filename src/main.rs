//! Binary entrypoint for the Samosval platform service.
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
};
use samosval::config::Config;
use samosval::db::{init_db, seed_default_users};
use samosval::locks::OpLocks;
use samosval::runtime::spawn_runtime_engine;
use samosval::streams::StreamHub;
use samosval::telemetry::{normalize_path, HTTP_REQUESTS, HTTP_REQUEST_DURATION};
use samosval::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = Config::from_env();
    let db = init_db(&config.database_url).await.expect("database must be available");
    seed_default_users(&db).await.expect("seeding default accounts");

    let state = AppState {
        db,
        hub: StreamHub::new(),
        locks: OpLocks::new(),
        config: Arc::new(config.clone()),
    };
    spawn_runtime_engine(state.clone());

    async fn track_metrics(mut req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        let path_label = normalize_path(req.uri().path());
        let req_id = Uuid::new_v4();
        req.extensions_mut().insert(req_id);
        let start = std::time::Instant::now();
        let mut resp = next.run(req).await;
        let status = resp.status().as_u16();
        let outcome = if status < 400 { "success" } else { "error" };
        HTTP_REQUESTS
            .with_label_values(&[method.as_str(), path_label.as_str(), &status.to_string(), outcome])
            .inc();
        HTTP_REQUEST_DURATION
            .with_label_values(&[method.as_str(), path_label.as_str()])
            .observe(start.elapsed().as_secs_f64());
        if let Ok(value) = HeaderValue::from_str(&req_id.to_string()) {
            resp.headers_mut().insert("x-request-id", value);
        }
        resp
    }

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(middleware::from_fn(track_metrics));

    info!(addr = %config.bind_addr, "samosval listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let shutdown = async {
        tokio::signal::ctrl_c().await.expect("install ctrl_c");
        info!("received Ctrl+C");
        tokio::time::sleep(Duration::from_millis(200)).await; // graceful drain window
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
