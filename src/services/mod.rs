//! Service layer: crawl orchestration, seeding and the queue worker.

pub mod seed;
pub mod spider;
pub mod worker;

pub use seed::{load_seeds, submit_seeds, SeedReport};
pub use spider::{CrawlReport, CrawlRequest, CrawlState, FanOutPolicy, Spider, SpiderOptions};
pub use worker::{JobReport, Worker, WorkerOptions};
