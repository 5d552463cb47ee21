//! Command-line surface (spec.md §6). The default (no subcommand) runs the
//! crawl daemon loop; `search`/`ask`/`summarize` are the out-of-core AI
//! query tools, reified here (SPEC_FULL.md §14).

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "catchup", about = "Feed crawl orchestrator and AI query tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the TOML crawl config (SPEC_FULL.md §12).
    #[arg(long, global = true, default_value = "catchup.toml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the crawl daemon loop (default when no subcommand is given).
    Crawl,

    /// Semantic search over persisted article summaries.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long = "min-similarity")]
        min_similarity: Option<f64>,
        #[arg(long, default_value = "text")]
        output: String,
    },

    /// Ask a question grounded in related article summaries.
    Ask {
        question: String,
        #[arg(long)]
        context: Option<u32>,
        #[arg(long, default_value = "text")]
        output: String,
    },

    /// Digest of recently-persisted articles.
    Summarize {
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        highlights: Option<u32>,
        #[arg(long, default_value = "text")]
        output: String,
    },
}
