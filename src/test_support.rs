//! Shared helpers for the unit and integration suites. Each state gets its own
//! in-memory database, so suites never interfere with each other.
use crate::auth;
use crate::config::Config;
use crate::db::{connect_pool, seed_default_users};
use crate::locks::OpLocks;
use crate::models::{DeploymentStatus, ImageStatus};
use crate::streams::StreamHub;
use crate::AppState;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub async fn test_state() -> AppState {
    test_state_with(Config::for_tests()).await
}

pub async fn test_state_with(config: Config) -> AppState {
    let db = connect_pool(&config.database_url, 1).await.expect("test database");
    seed_default_users(&db).await.expect("seed accounts");
    AppState { db, hub: StreamHub::new(), locks: OpLocks::new(), config: Arc::new(config) }
}

pub async fn user_id(pool: &Pool<Sqlite>, username: &str) -> Uuid {
    sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await
        .expect("seeded user")
}

/// Mint a session for a seeded account without going through the login route.
pub async fn token_for(state: &AppState, username: &str) -> String {
    let id = user_id(&state.db, username).await;
    auth::issue_session(&state.db, id).await.expect("session")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024).await.expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll until the image reaches the wanted status; panics after ~2s.
pub async fn wait_for_image_status(pool: &Pool<Sqlite>, id: Uuid, wanted: ImageStatus) {
    for _ in 0..200 {
        let status: ImageStatus = sqlx::query_scalar("SELECT status FROM images WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .expect("image row");
        if status == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("image {id} never reached {wanted:?}");
}

/// Poll until the deployment reaches the wanted status; panics after ~2s.
pub async fn wait_for_deployment_status(pool: &Pool<Sqlite>, id: Uuid, wanted: DeploymentStatus) {
    for _ in 0..200 {
        let status: DeploymentStatus = sqlx::query_scalar("SELECT status FROM deployments WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .expect("deployment row");
        if status == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {id} never reached {wanted:?}");
}
