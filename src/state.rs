use crate::blockchain::AdapterRegistry;
use crate::cache::InfoCache;
use crate::config::Config;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub db_pool: SqlitePool,
    pub registry: Arc<AdapterRegistry>,
    pub info_cache: InfoCache,
}
