use std::env;
use std::path::PathBuf;

use log::LevelFilter;

use crate::scheduler::DEFAULT_CONCURRENCY;

pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub catalog_api_url: String,
    pub catalog_auth_url: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_path: PathBuf,
    pub concurrency: usize,
    pub show_progress: bool,
    pub api_host: String,
    pub api_port: u16,
    pub static_dir: PathBuf,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            client_id: env::var("CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("CLIENT_SECRET").unwrap_or_default(),
            catalog_api_url: env::var("CATALOG_API_URL")
                .unwrap_or_else(|_| "https://api.spotify.com/v1".to_string()),
            catalog_auth_url: env::var("CATALOG_AUTH_URL")
                .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string()),
            input_dir: env::var("CHARTS_INPUT_DIR")
                .unwrap_or_else(|_| "Charts_no_info".to_string())
                .into(),
            output_dir: env::var("CHARTS_OUTPUT_DIR")
                .unwrap_or_else(|_| "Charts_with_info".to_string())
                .into(),
            cache_path: env::var("CACHE_FILE")
                .unwrap_or_else(|_| "catalog_cache.json".to_string())
                .into(),
            concurrency: env::var("ENRICH_CONCURRENCY")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|&value: &usize| value > 0)
                .unwrap_or(DEFAULT_CONCURRENCY),
            show_progress: env::var("SHOW_PROGRESS")
                .map(|value| !matches!(value.as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            static_dir: env::var("STATIC_DIR")
                .unwrap_or_else(|_| "frontend/static".to_string())
                .into(),
            log_level: env::var("LOG_LEVEL")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(LevelFilter::Info),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}
