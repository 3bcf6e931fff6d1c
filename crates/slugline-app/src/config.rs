//! Configuration loading: defaults, optional settings file, environment
//! overrides under the `SLUGLINE__` prefix.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "config/settings";
const ENV_PREFIX: &str = "SLUGLINE";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub vector: VectorConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// `fs` or `memory`.
    pub backend: String,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
    /// 0 disables client-side rate limiting.
    pub requests_per_second: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    pub base_url: String,
    pub class_name: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Consumer identities are `{prefix}-{pid}`; every worker process in a
    /// group must be distinct.
    pub consumer_prefix: String,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_storage = default_storage_path()?;
    let builder = Config::builder()
        .set_default("redis.url", "redis://127.0.0.1:6379")?
        .set_default("storage.backend", "fs")?
        .set_default(
            "storage.path",
            default_storage.to_string_lossy().to_string(),
        )?
        .set_default("llm.base_url", "https://api.openai.com/v1")?
        .set_default("llm.model", "gpt-3.5-turbo")?
        .set_default("llm.embedding_model", "text-embedding-ada-002")?
        .set_default("llm.request_timeout_secs", 60)?
        .set_default("llm.requests_per_second", 8)?
        .set_default("vector.base_url", "http://127.0.0.1:8080")?
        .set_default("vector.class_name", "Scene")?
        .set_default("vector.request_timeout_secs", 30)?
        .set_default("worker.consumer_prefix", "slugline-worker")?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "slugline", "slugline").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_storage_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join("objects"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let cfg = load().expect("defaults load without any file or env");
        assert_eq!(cfg.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.storage.backend, "fs");
        assert_eq!(cfg.llm.model, "gpt-3.5-turbo");
        assert_eq!(cfg.llm.embedding_model, "text-embedding-ada-002");
        assert_eq!(cfg.vector.class_name, "Scene");
        assert_eq!(cfg.worker.consumer_prefix, "slugline-worker");
    }
}
