//! Entrypoint: wires every concrete binding (Postgres stores, AI client,
//! notifier backends) into the crawl orchestrator, starts the metrics/health
//! server, and drives the crawl loop — or dispatches to an AI query
//! subcommand (spec.md §6).
//!
//! Grounded on the teacher's supervisor binary
//! (`rootsignal-scout-supervisor/src/main.rs`) for the overall shape, and on
//! `other_examples/miketigerblue-rust-feed-ingestor` for the metrics server +
//! `tokio::time::interval` ingestion loop.

mod aiquery;
mod cli;
mod embedder;
mod metrics;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use ai_client::openai::OpenAi;
use catchup_ai::{AiClientSummarizer, EmbeddingHook};
use catchup_core::{
    BreakerConfig, CircuitBreakerPreset, CrawlConfig, EnvConfig, GateOptions, UrlGate,
};
use catchup_crawler::CrawlOrchestrator;
use catchup_fetchers::{ContentEnhancer, HtmlContentEnhancer, HttpPhase};
use catchup_notify::{ChannelDispatcher, DiscordWebhook, NotifierFanout, SlackWebhook};
use catchup_reliability::{BackoffGrowth, CircuitBreaker, RateLimiter, RetryConfig};
use catchup_store::{migrate, EmbeddingStore, PgArticleStore, PgSourceStore};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cli::{Cli, Command};
use embedder::AiClientEmbedder;

const CHAT_MODEL: &str = "gpt-4o-mini";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

fn breaker_config(preset: CircuitBreakerPreset) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: preset.failure_threshold,
        min_requests: preset.min_requests,
        interval: preset.interval.0,
        open_timeout: preset.open_timeout.0,
        half_open_max_requests: preset.half_open_max_requests,
    }
}

fn retry_config(preset: catchup_core::RetryPreset) -> RetryConfig {
    RetryConfig {
        max_attempts: preset.max_attempts,
        base_delay: preset.base_delay.0,
        growth: if preset.exponential {
            BackoffGrowth::Exponential
        } else {
            BackoffGrowth::Linear
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    catchup_core::telemetry::init_tracing("catchup=info")?;

    let cli = Cli::parse();
    let env = EnvConfig::from_env()?;
    let crawl_config = CrawlConfig::from_file(std::path::Path::new(&cli.config))?;
    crawl_config.validate(&env.ai_grpc_address)?;

    let pool = PgPoolOptions::new()
        .max_connections(env.db_pool.max_open_conns)
        .min_connections(env.db_pool.max_idle_conns)
        .max_lifetime(env.db_pool.conn_max_lifetime)
        .idle_timeout(env.db_pool.conn_max_idle_time)
        .connect(&env.database_url)
        .await?;
    migrate(&pool).await?;
    info!("connected to postgres and ran migrations");

    match cli.command.unwrap_or(Command::Crawl) {
        Command::Crawl => run_crawl_loop(env, crawl_config, pool).await,
        Command::Search { query, limit, min_similarity, output } => {
            let format: aiquery::OutputFormat = output.parse().map_err(print_and_exit)?;
            let embeddings = EmbeddingStore::new(pool);
            let embed_client = OpenAi::from_env(EMBEDDING_MODEL)?;
            let hits = aiquery::search(
                &embed_client,
                &embeddings,
                &crawl_config.ai_service,
                &query,
                limit,
                min_similarity,
            )
            .await
            .map_err(print_and_exit)?;
            println!("{}", aiquery::render_search_hits(&hits, format));
            Ok(())
        }
        Command::Ask { question, context, output } => {
            let format: aiquery::OutputFormat = output.parse().map_err(print_and_exit)?;
            let embeddings = EmbeddingStore::new(pool);
            let embed_client = OpenAi::from_env(EMBEDDING_MODEL)?;
            let chat_client = OpenAi::from_env(CHAT_MODEL)?;
            let answer = aiquery::ask(
                &chat_client,
                &embed_client,
                &embeddings,
                &crawl_config.ai_service,
                &question,
                context,
            )
            .await
            .map_err(print_and_exit)?;
            println!("{}", aiquery::render_text(&answer, format));
            Ok(())
        }
        Command::Summarize { period, highlights, output } => {
            let format: aiquery::OutputFormat = output.parse().map_err(print_and_exit)?;
            let period = period.map(|p| p.parse()).transpose().map_err(print_and_exit)?;
            let articles = PgArticleStore::new(pool);
            let chat_client = OpenAi::from_env(CHAT_MODEL)?;
            let digest = aiquery::summarize(&chat_client, &articles, period, highlights)
                .await
                .map_err(print_and_exit)?;
            println!("{}", aiquery::render_text(&digest, format));
            Ok(())
        }
    }
}

/// Prints the error to stderr and translates it into process exit code 1,
/// matching spec.md §6's "exit 0 on success, 1 on argument/config/RPC error".
fn print_and_exit(err: impl std::fmt::Display) -> anyhow::Error {
    eprintln!("error: {err}");
    std::process::exit(1);
}

async fn run_crawl_loop(
    env: EnvConfig,
    crawl_config: CrawlConfig,
    pool: sqlx::PgPool,
) -> anyhow::Result<()> {
    let metrics = Arc::new(metrics::Metrics::new()?);
    let bind: SocketAddr = "0.0.0.0:9090".parse().expect("static bind address");
    server::spawn(bind, metrics.clone());

    let source_store: Arc<dyn catchup_store::SourceRepository> =
        Arc::new(PgSourceStore::new(pool.clone()));
    let article_store: Arc<dyn catchup_store::ArticleRepository> =
        Arc::new(PgArticleStore::new(pool.clone()));

    let gate = UrlGate::new(GateOptions::default());
    // Redirects are followed manually by `HttpPhase`, re-checking the gate
    // against each hop. `dns_resolver` pins every hostname lookup to
    // addresses the gate has just validated, so a short-TTL DNS record
    // can't rebind to a private address between the gate's check and the
    // client's own connection.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .dns_resolver(Arc::new(gate.resolver()))
        .build()?;

    let feed_fetch_breaker = Arc::new(
        CircuitBreaker::new("feed-fetch", breaker_config(crawl_config.feed_fetch_breaker))
            .with_observer(metrics.clone()),
    );

    let content_enhancer: Option<Arc<dyn ContentEnhancer>> = Some(Arc::new(
        HtmlContentEnhancer::new(
            HttpPhase::new(client.clone(), gate.clone())
                .with_retry_config(retry_config(crawl_config.feed_fetch_retry)),
        ),
    ));

    let summarizer = if env.ai_enabled {
        let ai_breaker = CircuitBreaker::new(
            "ai-summarize",
            breaker_config(crawl_config.ai_service.circuit_breaker),
        )
        .with_observer(metrics.clone());
        let chat_client = OpenAi::from_env(CHAT_MODEL)?;
        Arc::new(AiClientSummarizer::new(
            chat_client,
            ai_breaker,
            crawl_config.ai_service.timeouts.summary.0,
        )) as Arc<dyn catchup_ai::Summarizer>
    } else {
        anyhow::bail!("AI_ENABLED=false has no summarizer binding configured");
    };

    let embedder: Option<Arc<dyn catchup_ai::Embedder>> = if env.ai_enabled {
        let embed_client = OpenAi::from_env(EMBEDDING_MODEL)?;
        let embedding_store = EmbeddingStore::new(pool.clone());
        Some(Arc::new(AiClientEmbedder::new(
            embed_client,
            embedding_store,
            EMBEDDING_MODEL,
        )))
    } else {
        None
    };
    let embedding_hook = Arc::new(EmbeddingHook::new(embedder).with_observer(metrics.clone()));

    let mut dispatchers = Vec::new();
    if let Some(url) = env.notifier_webhooks.discord.clone() {
        let breaker = Arc::new(
            CircuitBreaker::new("notify-discord", breaker_config(crawl_config.notifier_breaker))
                .with_observer(metrics.clone()),
        );
        dispatchers.push(
            ChannelDispatcher::new(Arc::new(DiscordWebhook::new(url)), RateLimiter::discord(), Some(breaker))
                .with_retry_config(retry_config(crawl_config.notifier_retry))
                .with_observer(metrics.clone()),
        );
    }
    if let Some(url) = env.notifier_webhooks.slack.clone() {
        let breaker = Arc::new(
            CircuitBreaker::new("notify-slack", breaker_config(crawl_config.notifier_breaker))
                .with_observer(metrics.clone()),
        );
        dispatchers.push(
            ChannelDispatcher::new(Arc::new(SlackWebhook::new(url)), RateLimiter::slack(), Some(breaker))
                .with_retry_config(retry_config(crawl_config.notifier_retry))
                .with_observer(metrics.clone()),
        );
    }
    let notifier = Arc::new(NotifierFanout::new(dispatchers));

    let orchestrator = CrawlOrchestrator::new(
        source_store,
        article_store,
        crawl_config,
        client,
        gate,
        feed_fetch_breaker,
        content_enhancer,
        summarizer,
        embedding_hook,
        notifier,
    )
    .with_observer(metrics.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, finishing in-flight pass");
            cancel.cancel();
        });
    }

    let mut ticker = interval(std::time::Duration::from_secs(300));
    loop {
        ticker.tick().await;
        if cancel.is_cancelled() {
            break;
        }
        match orchestrator.run_pass(&cancel).await {
            Ok(stats) => {
                metrics.observe_pass(&stats);
                info!(%stats, "crawl pass complete");
            }
            Err(err) => {
                error!(%err, "crawl pass aborted");
            }
        }
    }

    Ok(())
}
