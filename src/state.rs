use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::assets::AssetStore;
use crate::auth::TokenKeys;
use crate::config::Config;
use crate::error::AppResult;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub assets: Arc<dyn AssetStore>,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config, assets: Arc<dyn AssetStore>) -> AppResult<Self> {
        let tokens = Arc::new(TokenKeys::from_config(&config.auth)?);
        Ok(Self {
            db,
            config,
            assets,
            tokens,
        })
    }
}
