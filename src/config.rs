use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::services::storage::CollisionPolicy;

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service_host: String,
    pub service_port: u16,
    pub workers: usize,

    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    pub on_collision: CollisionPolicy,

    /// Externally visible base URL used for download links. Falls back to the
    /// request's own scheme and host when unset.
    pub public_url: Option<String>,

    pub cors_domains: Vec<String>,
    pub is_development: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_host: "127.0.0.1".to_string(),
            service_port: 8080,
            workers: 2,
            upload_dir: PathBuf::from("./uploads"),
            max_upload_size: 10 * 1024 * 1024,
            on_collision: CollisionPolicy::Overwrite,
            public_url: None,
            cors_domains: Vec::new(),
            is_development: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        Ok(Config {
            service_host: Self::get_env("SERVICE_HOST", "127.0.0.1"),
            service_port: Self::get_env_parsed("SERVICE_PORT", 8080)?,
            workers: Self::get_env_parsed("WORKERS", 2)?,

            upload_dir: PathBuf::from(Self::get_env("FILE_UPLOAD_DIR", "./uploads")),
            max_upload_size: Self::get_env_parsed("MAX_UPLOAD_SIZE", 10 * 1024 * 1024)?,
            on_collision: Self::get_env_parsed("FILE_ON_COLLISION", CollisionPolicy::Overwrite)?,

            public_url: env::var("PUBLIC_URL")
                .ok()
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),

            cors_domains: Self::get_env_list("CORS_DOMAINS", ""),
            is_development: Self::get_env_parsed("IS_DEVELOPMENT", false)?,
        })
    }

    fn get_env(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_env_list(key: &str, default: &str) -> Vec<String> {
        Self::parse_list(&Self::get_env(key, default))
    }

    fn get_env_parsed<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
        match env::var(key) {
            Ok(value) => value.trim().parse().map_err(|_| ConfigError {
                key: key.to_string(),
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
