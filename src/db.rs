use crate::auth;
use crate::models::Role;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub async fn connect_pool(database_url: &str, max_connections: u32) -> anyhow::Result<Pool<Sqlite>> {
    // Each pooled connection to :memory: would open a distinct database, so an
    // in-memory URL is pinned to a single long-lived connection.
    let memory = database_url.contains(":memory:");
    let max_connections = if memory { 1 } else { max_connections };
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(if memory { 1 } else { 0 })
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(opts)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

pub async fn init_db(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    let pool = connect_pool(database_url, 5).await?;
    info!("migrations applied");
    Ok(pool)
}

/// Seed the stock admin/operator/developer accounts if they are missing.
pub async fn seed_default_users(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    for (username, password, role) in [
        ("admin", "admin123", Role::Admin),
        ("operator", "operator123", Role::Operator),
        ("developer", "developer123", Role::Developer),
    ] {
        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            continue;
        }
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, banned, created_at) VALUES (?,?,?,?,?,0,?)",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(format!("{username}@samosval.local"))
        .bind(auth::hash_password(password))
        .bind(role)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        info!(%username, "seeded default account");
    }
    Ok(())
}
