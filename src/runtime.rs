//! Runtime engine: a background ticker that reconciles observable state for
//! running deployments by feeding their log streams and CPU/RAM sample
//! windows. Ticks never crash the loop; failures are logged and retried on
//! the next interval.
use crate::models::DeploymentStatus;
use crate::AppState;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

const INFO_LINES: [&str; 3] = ["Handling request", "Background job executed", "Health check OK"];
const WARN_LINES: [&str; 2] = ["Slow response detected", "Retrying external call"];
const ERROR_LINES: [&str; 2] = ["Unhandled exception in worker", "Database connection timeout"];

pub fn spawn_runtime_engine(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(state.config.tick_ms.max(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = tick(&state).await {
                tracing::warn!(error = %e, "runtime tick failed");
            }
        }
    })
}

/// One reconciliation pass over all running deployments. Exposed so tests can
/// drive the engine deterministically without the timer.
pub async fn tick(state: &AppState) -> Result<(), sqlx::Error> {
    let rows: Vec<(Uuid, String, String, String)> = sqlx::query_as(
        "SELECT d.id, d.name, i.name, i.tag FROM deployments d JOIN images i ON i.id = d.image_id WHERE d.status = ?",
    )
    .bind(DeploymentStatus::Running)
    .fetch_all(&state.db)
    .await?;

    let mut rng = rand::thread_rng();
    for (id, name, image_name, tag) in rows {
        for _ in 0..rng.gen_range(1..=3) {
            state.hub.publish_log(id, runtime_log_line(&mut rng, &name, &image_name, &tag));
        }
        let (cpu, ram) = state.hub.last_sample(id).unwrap_or((50.0, 50.0));
        let cpu = (cpu + rng.gen_range(-5.0..5.0)).clamp(0.0, 100.0);
        let ram = (ram + rng.gen_range(-5.0..5.0)).clamp(0.0, 100.0);
        state.hub.record_sample(id, cpu, ram);
    }
    Ok(())
}

fn runtime_log_line(rng: &mut impl Rng, name: &str, image_name: &str, tag: &str) -> String {
    let roll: u8 = rng.gen_range(0..100);
    let (level, pool): (&str, &[&str]) = if roll < 80 {
        ("INFO", &INFO_LINES)
    } else if roll < 95 {
        ("WARN", &WARN_LINES)
    } else {
        ("ERROR", &ERROR_LINES)
    };
    let msg = pool.choose(rng).copied().unwrap_or("Heartbeat");
    format!("{} [{level}] {name} ({image_name}:{tag}) - {msg}", Utc::now().format("%Y-%m-%dT%H:%M:%S"))
}
