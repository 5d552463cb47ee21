pub mod article_store;
pub mod embedding_store;
pub mod error;
pub mod source_store;

pub use article_store::{ArticleRepository, PgArticleStore};
pub use embedding_store::{EmbeddingStore, SimilarityMatch};
pub use error::{StoreError, StoreResult};
pub use source_store::{PgSourceStore, SourceRepository};

use sqlx::PgPool;

/// Runs the embedded SQL migrations against `pool`. Call once at startup
/// before any store is used.
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
