use std::path::PathBuf;

/// Server configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub generation_api_url: String,
    pub generation_api_key: String,
    pub judge_api_url: String,
    pub judge_api_key: String,
    pub storage_root: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_addr: get("PIPELINE_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3001".to_string()),
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:pipeline.db".to_string()),
            generation_api_url: get("GENERATION_API_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            generation_api_key: get("GENERATION_API_KEY").unwrap_or_default(),
            judge_api_url: get("JUDGE_API_URL")
                .unwrap_or_else(|| "http://localhost:8081".to_string()),
            judge_api_key: get("JUDGE_API_KEY").unwrap_or_default(),
            storage_root: get("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/objects")),
        }
    }
}
