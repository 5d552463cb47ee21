#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("scraper_config is not valid JSON: {0}")]
    InvalidScraperConfig(serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
