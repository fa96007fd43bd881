use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub http_bind: String,
    pub auth_grpc_bind: String,
    pub secret_file: PathBuf,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env_string("REDSAFE_DATABASE_URL", None)?;
        let http_bind = env_string("REDSAFE_HTTP_BIND", Some("127.0.0.1:8080".to_string()))?;
        let auth_grpc_bind = env_string(
            "REDSAFE_AUTH_GRPC_BIND",
            Some("127.0.0.1:50051".to_string()),
        )?;
        let secret_file = PathBuf::from(env_string(
            "REDSAFE_SECRET_FILE",
            Some("jwt_secret.txt".to_string()),
        )?);

        Ok(Self {
            database_url,
            http_bind,
            auth_grpc_bind,
            secret_file,
        })
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}
