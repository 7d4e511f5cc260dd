use crate::error::{ApiError, OpsError};
use crate::models::Role;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Authenticated caller, resolved once per request and stashed in extensions.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let salt = hex::encode(salt);
    let digest = password_digest(&salt, password);
    format!("{salt}${digest}")
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, digest)) = stored.split_once('$') else { return false };
    ct_equal(&password_digest(salt, password), digest)
}

fn password_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

// Constant-time equality
fn ct_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mint an opaque bearer token for the user; only its digest is stored.
pub async fn issue_session(pool: &Pool<Sqlite>, user_id: Uuid) -> Result<String, sqlx::Error> {
    let raw: [u8; 32] = rand::random();
    let token = hex::encode(raw);
    sqlx::query("INSERT INTO sessions (id, user_id, token_hash, created_at) VALUES (?,?,?,?)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_digest(&token))
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(token)
}

/// Token -> identity. The ban flag is re-read on every call, so banning takes
/// effect on the banned user's next request.
pub async fn resolve_token(pool: &Pool<Sqlite>, token: &str) -> Result<Identity, OpsError> {
    let row: Option<(Uuid, String, Role, bool)> = sqlx::query_as(
        "SELECT u.id, u.username, u.role, u.banned FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token_hash = ?",
    )
    .bind(token_digest(token))
    .fetch_optional(pool)
    .await?;
    match row {
        None => Err(OpsError::Unauthorized("invalid token".into())),
        Some((_, username, _, true)) => {
            tracing::debug!(%username, "banned account rejected");
            Err(OpsError::Forbidden("account is banned".into()))
        }
        Some((user_id, username, role, false)) => Ok(Identity { user_id, username, role }),
    }
}

fn extract_bearer(req: &Request) -> Option<String> {
    let header = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() == 2 && parts[0].eq_ignore_ascii_case("Bearer") {
        Some(parts[1].trim().to_string())
    } else {
        None
    }
}

fn is_public(path: &str) -> bool {
    matches!(
        path,
        "/health" | "/metrics" | "/openapi.json" | "/swagger" | "/api/auth/login" | "/api/auth/register"
    )
}

pub async fn auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let path = req.uri().path();
    if is_public(path) {
        return Ok(next.run(req).await);
    }
    let Some(token) = extract_bearer(&req) else {
        tracing::debug!(%path, "missing bearer token");
        return Err(ApiError::unauthorized("missing bearer token").into_response());
    };
    let identity = resolve_token(&state.db, &token)
        .await
        .map_err(|e| e.into_response())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn require_role(req: &Request, allowed: &[Role]) -> Result<(), ApiError> {
    match req.extensions().get::<Identity>() {
        Some(id) if allowed.contains(&id.role) => Ok(()),
        Some(_) => Err(ApiError::forbidden("insufficient role")),
        None => Err(ApiError::unauthorized("missing identity")),
    }
}

pub async fn require_operator_mw(req: Request, next: Next) -> Result<Response, Response> {
    match require_role(&req, &[Role::Operator, Role::Admin]) {
        Ok(()) => Ok(next.run(req).await),
        Err(e) => Err(e.into_response()),
    }
}

pub async fn require_admin_mw(req: Request, next: Next) -> Result<Response, Response> {
    match require_role(&req, &[Role::Admin]) {
        Ok(()) => Ok(next.run(req).await),
        Err(e) => Err(e.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let stored = hash_password("s3cret");
        assert!(verify_password(&stored, "s3cret"));
        assert!(!verify_password(&stored, "s3cret2"));
    }

    #[test]
    fn distinct_salts_per_hash() {
        assert_ne!(hash_password("x"), hash_password("x"));
    }

    #[test]
    fn malformed_stored_hash_rejected() {
        assert!(!verify_password("nodollar", "x"));
    }
}
