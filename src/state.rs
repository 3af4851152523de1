use crate::{
    cache::RedisPool,
    config::AppConfig,
    db::{DbPool, OrmConn},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub cache: RedisPool,
    pub config: AppConfig,
}
