//! AI-side CLI query tools: search / ask / summarize (spec.md §6, SPEC_FULL.md
//! §14 — "reified as real subcommands with real (if stubbed) AI-binding
//! calls"). Out-of-core per spec.md §1, but implemented end to end here so
//! the crate is runnable as more than a library skeleton.

use ai_client::openai::OpenAi;
use ai_client::traits::{Agent, EmbedAgent, PromptBuilder};
use catchup_core::{AiServiceConfig, EmbeddingType};
use catchup_store::{ArticleRepository, EmbeddingStore, SimilarityMatch};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("argument out of range: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Ai(#[from] anyhow::Error),
    #[error(transparent)]
    Store(#[from] catchup_store::StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(QueryError::InvalidArgument(format!(
                "unknown --output value: {other}"
            ))),
        }
    }
}

#[derive(Serialize)]
pub struct SearchHit {
    pub article_id: i64,
    pub title: String,
    pub url: String,
    pub similarity: f64,
}

/// `search "<query>" [--limit N] [--min-similarity X]` (spec.md §6).
pub async fn search(
    embed_client: &OpenAi,
    embeddings: &EmbeddingStore,
    cfg: &AiServiceConfig,
    query: &str,
    limit: Option<u32>,
    min_similarity: Option<f64>,
) -> Result<Vec<SearchHit>, QueryError> {
    let limit = limit.unwrap_or(cfg.search.default_limit);
    if limit == 0 || limit > cfg.search.max_limit {
        return Err(QueryError::InvalidArgument(format!(
            "--limit must be in [1, {}]",
            cfg.search.max_limit
        )));
    }
    let min_similarity = min_similarity.unwrap_or(cfg.search.default_min_similarity);
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(QueryError::InvalidArgument(
            "--min-similarity must be in [0, 1]".to_string(),
        ));
    }

    let query_vector = embed_client.embed(query.to_string()).await?;
    let matches: Vec<SimilarityMatch> = embeddings
        .search_similar(
            EmbeddingType::Summary,
            &query_vector,
            min_similarity,
            limit as usize,
        )
        .await?;

    Ok(matches
        .into_iter()
        .map(|m| SearchHit {
            article_id: m.article.id,
            title: m.article.title,
            url: m.article.url,
            similarity: m.similarity,
        })
        .collect())
}

const ASK_PREAMBLE: &str =
    "Answer the question using only the provided article excerpts. If the excerpts don't contain the answer, say so plainly.";

/// `ask "<question>" [--context N]` (spec.md §6). Pulls `context` related
/// articles via the same similarity search `search` uses, then asks the
/// chat model to answer grounded in their summaries.
pub async fn ask(
    chat_client: &OpenAi,
    embed_client: &OpenAi,
    embeddings: &EmbeddingStore,
    cfg: &AiServiceConfig,
    question: &str,
    context: Option<u32>,
) -> Result<String, QueryError> {
    let context = context.unwrap_or(cfg.search.default_max_context);
    if context == 0 || context > cfg.search.max_context {
        return Err(QueryError::InvalidArgument(format!(
            "--context must be in [1, {}]",
            cfg.search.max_context
        )));
    }

    let query_vector = embed_client.embed(question.to_string()).await?;
    let matches = embeddings
        .search_similar(EmbeddingType::Summary, &query_vector, 0.0, context as usize)
        .await?;

    let excerpts: String = matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "[{}] {} ({})\n{}",
                i + 1,
                m.article.title,
                m.article.url,
                m.article.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!("Question: {question}\n\nArticle excerpts:\n{excerpts}");

    let answer = chat_client
        .prompt(prompt)
        .preamble(ASK_PREAMBLE)
        .send()
        .await?;
    Ok(answer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
}

impl std::str::FromStr for Period {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(QueryError::InvalidArgument(format!(
                "unknown --period value: {other}"
            ))),
        }
    }
}

impl Period {
    fn lookback(self) -> ChronoDuration {
        match self {
            Period::Week => ChronoDuration::days(7),
            Period::Month => ChronoDuration::days(30),
        }
    }
}

const SUMMARIZE_PREAMBLE: &str =
    "Write a digest of the week's news grouped by theme, calling out the highlights below explicitly.";

/// `summarize [--period week|month] [--highlights N]` (spec.md §6). Pulls
/// every article persisted in the period and asks the chat model for a
/// digest, the way the crawl orchestrator's own summarizer calls the model
/// (C6, `catchup_ai::AiClientSummarizer`) but over a period instead of a
/// single article.
pub async fn summarize(
    chat_client: &OpenAi,
    articles: &dyn ArticleRepository,
    period: Option<Period>,
    highlights: Option<u32>,
) -> Result<String, QueryError> {
    let period = period.unwrap_or(Period::Week);
    let highlights = highlights.unwrap_or(5);
    if highlights == 0 {
        return Err(QueryError::InvalidArgument(
            "--highlights must be at least 1".to_string(),
        ));
    }

    let since = Utc::now() - period.lookback();
    let recent = articles.list_since(since).await?;
    if recent.is_empty() {
        return Ok("No articles were published in the requested period.".to_string());
    }

    let body: String = recent
        .iter()
        .map(|a| format!("- {} ({})\n  {}", a.title, a.url, a.summary))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Articles from the last {}:\n{}\n\nCall out the {} most important items as highlights.",
        if period == Period::Week { "week" } else { "month" },
        body,
        highlights
    );

    let digest = chat_client
        .prompt(prompt)
        .preamble(SUMMARIZE_PREAMBLE)
        .send()
        .await?;
    Ok(digest)
}

pub fn render_search_hits(hits: &[SearchHit], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(hits).unwrap_or_default(),
        OutputFormat::Text => {
            if hits.is_empty() {
                return "No matches.".to_string();
            }
            hits.iter()
                .map(|h| {
                    format!(
                        "{:.3}  {}  {}",
                        h.similarity, h.title, h.url
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

pub fn render_text(text: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&serde_json::json!({ "text": text })).unwrap_or_default()
        }
        OutputFormat::Text => text.to_string(),
    }
}
