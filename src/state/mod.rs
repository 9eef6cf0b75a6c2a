//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageTask`: a unit of work (normalized URL, page kind, depth, attempts)
//! - `FailureKind`: why a task was terminally resolved as a failure
//! - `CrawlState`: the persisted snapshot (pending tasks, visited set, counters)

mod crawl_state;
mod page_task;

// Re-export main types
pub use crawl_state::{CrawlCounters, CrawlState, FailureRecord};
pub use page_task::{FailureKind, PageKind, PageTask};
