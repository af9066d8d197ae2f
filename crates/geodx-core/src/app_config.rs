use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub questions_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub worker_concurrency: usize,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_delay_ms: u64,
    pub execution_timeout_secs: u64,
    pub adapter_timeout_secs: u64,
    pub checkpoint_every: u32,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub glm_api_key: Option<String>,
    pub glm_base_url: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("questions_path", &self.questions_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("execution_timeout_secs", &self.execution_timeout_secs)
            .field("adapter_timeout_secs", &self.adapter_timeout_secs)
            .field("checkpoint_every", &self.checkpoint_every)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field(
                "glm_api_key",
                &self.glm_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("glm_base_url", &self.glm_base_url)
            .finish()
    }
}
