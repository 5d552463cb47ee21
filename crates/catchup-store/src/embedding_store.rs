//! Persists vectors produced out-of-band by the embedding hook (C7). Not in
//! the per-item pipeline's critical path — written after `embed_async`
//! resolves, on whatever task is running the embedder.

use chrono::Utc;
use sqlx::PgPool;

use catchup_core::{Article, ArticleEmbedding, EmbeddingProvider, EmbeddingType};

use crate::error::StoreResult;

#[derive(Clone)]
pub struct EmbeddingStore {
    pool: PgPool,
}

/// Row backing a similarity match: the article plus the vector's raw
/// cosine similarity against the query embedding.
pub struct SimilarityMatch {
    pub article: Article,
    pub similarity: f64,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

fn embedding_type_str(t: EmbeddingType) -> &'static str {
    match t {
        EmbeddingType::Title => "title",
        EmbeddingType::Content => "content",
        EmbeddingType::Summary => "summary",
    }
}

fn provider_str(p: EmbeddingProvider) -> &'static str {
    match p {
        EmbeddingProvider::Openai => "openai",
        EmbeddingProvider::Voyage => "voyage",
    }
}

impl EmbeddingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts one (article, embedding_type) vector. Re-embedding the same
    /// article/type overwrites the prior vector rather than duplicating it.
    pub async fn upsert(&self, embedding: &ArticleEmbedding) -> StoreResult<()> {
        let vector: Vec<f64> = embedding.vector.iter().map(|v| *v as f64).collect();
        let updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO article_embeddings
                (article_id, embedding_type, provider, model, dimension, vector, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (article_id, embedding_type)
            DO UPDATE SET provider = $3, model = $4, dimension = $5, vector = $6, updated_at = $8
            "#,
        )
        .bind(embedding.article_id)
        .bind(embedding_type_str(embedding.embedding_type))
        .bind(provider_str(embedding.provider))
        .bind(&embedding.model)
        .bind(embedding.dimension as i32)
        .bind(&vector)
        .bind(embedding.created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Ranks every `embedding_type` vector by cosine similarity against
    /// `query_vector`, returning the top `limit` matches at or above
    /// `min_similarity`. Backs the `search` AI CLI subcommand (spec.md §6).
    ///
    /// `article_embeddings.vector` is a plain `double precision[]` column, not
    /// a `pgvector` type, so the candidate set is fetched and ranked in
    /// process rather than via an ORDER BY on the database side.
    pub async fn search_similar(
        &self,
        embedding_type: EmbeddingType,
        query_vector: &[f32],
        min_similarity: f64,
        limit: usize,
    ) -> StoreResult<Vec<SimilarityMatch>> {
        let rows = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT a.id, a.source_id, a.title, a.url, a.summary, a.published_at, a.created_at,
                   e.vector
            FROM article_embeddings e
            JOIN articles a ON a.id = e.article_id
            WHERE e.embedding_type = $1
            "#,
        )
        .bind(embedding_type_str(embedding_type))
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<SimilarityMatch> = rows
            .into_iter()
            .map(|row| {
                let vector: Vec<f32> = row.vector.iter().map(|v| *v as f32).collect();
                let similarity = cosine_similarity(query_vector, &vector);
                SimilarityMatch {
                    article: row.into_article(),
                    similarity,
                }
            })
            .filter(|m| m.similarity >= min_similarity)
            .collect();

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    source_id: i64,
    title: String,
    url: String,
    summary: String,
    published_at: chrono::DateTime<Utc>,
    created_at: chrono::DateTime<Utc>,
    vector: Vec<f64>,
}

impl CandidateRow {
    fn into_article(self) -> Article {
        Article {
            id: self.id,
            source_id: self.source_id,
            title: self.title,
            url: self.url,
            summary: self.summary,
            published_at: self.published_at,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_type_round_trips_to_expected_strings() {
        assert_eq!(embedding_type_str(EmbeddingType::Title), "title");
        assert_eq!(embedding_type_str(EmbeddingType::Content), "content");
        assert_eq!(embedding_type_str(EmbeddingType::Summary), "summary");
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.1, 0.2, 0.3];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_against_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn provider_round_trips_to_expected_strings() {
        assert_eq!(provider_str(EmbeddingProvider::Openai), "openai");
        assert_eq!(provider_str(EmbeddingProvider::Voyage), "voyage");
    }
}
