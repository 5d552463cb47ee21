//! Concrete binding for C7's `Embedder` trait: calls the AI service's
//! embedding endpoint via `ai-client`'s `EmbedAgent`, then persists the
//! vector (spec.md §4.7, SPEC_FULL.md §4.6/4.7 AMBIENT note).

use ai_client::openai::OpenAi;
use ai_client::traits::EmbedAgent;
use catchup_ai::Embedder;
use catchup_core::{Article, ArticleEmbedding, EmbeddingProvider, EmbeddingType};
use catchup_store::EmbeddingStore;
use chrono::Utc;

pub struct AiClientEmbedder {
    client: OpenAi,
    store: EmbeddingStore,
    model: String,
}

impl AiClientEmbedder {
    pub fn new(client: OpenAi, store: EmbeddingStore, model: impl Into<String>) -> Self {
        Self {
            client,
            store,
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for AiClientEmbedder {
    async fn embed(&self, article: &Article) -> anyhow::Result<()> {
        let vector = self.client.embed(article.summary.clone()).await?;
        let now = Utc::now();
        let embedding = ArticleEmbedding {
            article_id: article.id,
            embedding_type: EmbeddingType::Summary,
            provider: EmbeddingProvider::Openai,
            model: self.model.clone(),
            dimension: vector.len(),
            vector,
            created_at: now,
            updated_at: now,
        };
        embedding.validate()?;
        self.store.upsert(&embedding).await?;
        Ok(())
    }
}
