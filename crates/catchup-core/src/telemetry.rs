//! Tracing initialization (spec.md §10 `[AMBIENT]`). Plain text by default,
//! JSON when `LOG_FORMAT=json` — the latter is what a container log
//! collector expects in production.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. Call once at process start,
/// before anything logs.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}
