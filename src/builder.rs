//! Image builder: renders the Dockerfile for an application and drives the
//! simulated build to ready/failed, appending staged build-log lines along the
//! way. The caller hands over the image claim so at most one build per image
//! id is in flight; the claim is released when the task finishes.
use crate::audit::{self, AuditAction};
use crate::locks::Claim;
use crate::models::{Application, ImageStatus};
use crate::AppState;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use uuid::Uuid;

const SUPPORTED_SCHEMES: [&str; 4] = ["git://", "http://", "https://", "ssh://"];

pub fn generate_dockerfile(app: &Application) -> String {
    let mut dockerfile = format!("FROM {}\n\n", app.base_image);
    dockerfile.push_str(&format!("RUN git clone -b {} {} /app\n", app.branch, app.git_repo));
    dockerfile.push_str("WORKDIR /app\n\n");
    for cmd in app.run_commands.iter() {
        dockerfile.push_str(&format!("RUN {cmd}\n"));
    }
    if !app.entrypoint.is_empty() {
        dockerfile.push_str(&format!("\nENTRYPOINT {}\n", app.entrypoint));
    }
    dockerfile
}

pub fn spawn_build(state: AppState, claim: Claim, image_id: Uuid, actor_id: Uuid) {
    tokio::spawn(async move {
        let _claim = claim;
        if let Err(e) = run_build(&state, image_id, actor_id).await {
            tracing::error!(image_id = %image_id, error = %e, "build task error");
            let _ = mark_failed(&state.db, image_id, &format!("internal build error: {e}")).await;
        }
    });
}

async fn run_build(state: &AppState, image_id: Uuid, actor_id: Uuid) -> Result<(), sqlx::Error> {
    let step = Duration::from_millis(state.config.build_step_ms);
    let app: Application = sqlx::query_as(
        "SELECT a.* FROM applications a JOIN images i ON i.application_id = a.id WHERE i.id = ?",
    )
    .bind(image_id)
    .fetch_one(&state.db)
    .await?;

    append_log(&state.db, image_id, "[builder] build started\n").await?;
    let mut steps = vec![
        format!("[builder] Cloning {} (branch {})...\n", app.git_repo, app.branch),
        "[builder] Checking out commit...\n".to_string(),
    ];
    for cmd in app.run_commands.iter() {
        steps.push(format!("[builder] RUN {cmd}\n"));
    }
    steps.push("[builder] Optimizing layers...\n".to_string());
    steps.push("[builder] Pushing image to registry...\n".to_string());
    for line in steps {
        tokio::time::sleep(step).await;
        append_log(&state.db, image_id, &line).await?;
    }

    let supported = SUPPORTED_SCHEMES.iter().any(|s| app.git_repo.starts_with(s));
    let outcome = if supported {
        append_log(&state.db, image_id, "[builder] build SUCCESS\n").await?;
        sqlx::query("UPDATE images SET status = ?, failure_reason = NULL, updated_at = ? WHERE id = ?")
            .bind(ImageStatus::Ready)
            .bind(Utc::now())
            .bind(image_id)
            .execute(&state.db)
            .await?;
        tracing::info!(image_id = %image_id, "image build succeeded");
        "ready"
    } else {
        let reason = format!("unsupported repo scheme: {}", app.git_repo);
        append_log(&state.db, image_id, "[builder] build FAILED\n").await?;
        mark_failed(&state.db, image_id, &reason).await?;
        tracing::warn!(image_id = %image_id, %reason, "image build failed");
        "failed"
    };
    audit::record(
        &state.db,
        Some(actor_id),
        AuditAction::ImageBuildFinished,
        Some(audit::resource::IMAGE),
        Some(image_id),
        Some(serde_json::json!({ "outcome": outcome })),
    )
    .await;
    Ok(())
}

async fn mark_failed(pool: &Pool<Sqlite>, image_id: Uuid, reason: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE images SET status = ?, failure_reason = ?, updated_at = ? WHERE id = ?")
        .bind(ImageStatus::Failed)
        .bind(reason)
        .bind(Utc::now())
        .bind(image_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn append_log(pool: &Pool<Sqlite>, image_id: Uuid, line: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE images SET build_log = build_log || ? WHERE id = ?")
        .bind(line)
        .bind(image_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn sample_app() -> Application {
        Application {
            id: Uuid::new_v4(),
            developer_id: Uuid::new_v4(),
            git_repo: "https://git.example/app.git".into(),
            branch: "main".into(),
            base_image: "python:3.12-slim".into(),
            image_name: "demo".into(),
            run_commands: Json(vec!["pip install -r requirements.txt".into()]),
            entrypoint: "[\"python\", \"main.py\"]".into(),
            status: crate::models::ApplicationStatus::Pending,
            operator_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dockerfile_layout() {
        let text = generate_dockerfile(&sample_app());
        assert!(text.starts_with("FROM python:3.12-slim\n"));
        assert!(text.contains("RUN git clone -b main https://git.example/app.git /app\n"));
        assert!(text.contains("RUN pip install -r requirements.txt\n"));
        assert!(text.ends_with("ENTRYPOINT [\"python\", \"main.py\"]\n"));
    }

    #[test]
    fn dockerfile_omits_empty_entrypoint() {
        let mut app = sample_app();
        app.entrypoint = String::new();
        let text = generate_dockerfile(&app);
        assert!(!text.contains("ENTRYPOINT"));
    }
}
