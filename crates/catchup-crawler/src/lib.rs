pub mod error;
pub mod orchestrator;

pub use error::CrawlFatal;
pub use orchestrator::{CrawlObserver, CrawlOrchestrator};
