use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub grpc_bind: String,
    pub model_path: PathBuf,
}

impl InferenceConfig {
    pub fn from_env() -> Result<Self> {
        let grpc_bind = env_string("REDSAFE_FALL_GRPC_BIND", Some("0.0.0.0:50052".to_string()))?;
        let model_path = PathBuf::from(env_string(
            "REDSAFE_FALL_MODEL_PATH",
            Some("fall_model.json".to_string()),
        )?);
        Ok(Self {
            grpc_bind,
            model_path,
        })
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}
