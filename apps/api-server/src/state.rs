use crate::auth::TokenService;
use crate::config::ApiConfig;
use crate::db::Repo;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub repo: Repo,
    pub tokens: Arc<TokenService>,
}
