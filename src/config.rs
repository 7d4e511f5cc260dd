use std::net::SocketAddr;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
    /// Pause between simulated build steps; 0 makes builds converge immediately.
    pub build_step_ms: u64,
    /// Pause before a restart settles into running/failed.
    pub restart_delay_ms: u64,
    /// Runtime engine tick that feeds logs and metric samples.
    pub tick_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://samosval.db".to_string());
        let bind_addr = std::env::var("SAMOSVAL_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:5000".parse().expect("static addr"));
        Self {
            database_url,
            bind_addr,
            max_body_bytes: env_u64("SAMOSVAL_MAX_BODY_BYTES", 1024 * 1024) as usize,
            build_step_ms: env_u64("SAMOSVAL_BUILD_STEP_MS", 400),
            restart_delay_ms: env_u64("SAMOSVAL_RESTART_DELAY_MS", 500),
            tick_ms: env_u64("SAMOSVAL_TICK_MS", 1000),
        }
    }

    /// In-memory database and zero delays so suites converge without sleeping.
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:0".parse().expect("static addr"),
            max_body_bytes: 1024 * 1024,
            build_step_ms: 0,
            restart_delay_ms: 0,
            tick_ms: 20,
        }
    }
}
