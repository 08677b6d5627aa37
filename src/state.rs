use std::sync::Arc;

use crate::auth::memory::MemoryUserRepo;
use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::config::AppConfig;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
}

impl AppState {
    /// Reads config from the environment, connects to Postgres and applies migrations.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;
        let users = Arc::new(PgUserRepo::new(pool)) as Arc<dyn UserRepo>;
        Ok(Self { config, users })
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserRepo>) -> Self {
        Self { config, users }
    }

    /// Test config over an empty in-memory user store.
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserRepo::new()),
        )
    }
}
