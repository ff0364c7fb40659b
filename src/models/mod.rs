//! Domain models for crawled pages and crawl jobs.

mod content;
mod document;
mod fetch;
mod job;

pub use content::{CryptoAddresses, ExtractedContent, LinkRef};
pub use document::{netloc_of, CrawlDocument};
pub use fetch::{FetchOutcome, FetchResult, UNAVAILABLE_STATUS};
pub use job::{
    CaptureJob, CrawlJob, EnqueueOptions, JobKind, DEFAULT_JOB_RESULT_TTL, DEFAULT_JOB_TTL,
};
