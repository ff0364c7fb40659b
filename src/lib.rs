//! onionspider: crawl orchestration for onion and clear-web pages.
//!
//! Pages are fetched through a SOCKS5 proxy, parsed for links and a fixed set
//! of address patterns, upserted into a document store by URL, and fanned out
//! to discovered links through a job queue until the depth budget runs out.

pub mod capture;
pub mod config;
pub mod context;
pub mod models;
pub mod onion;
pub mod queue;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;

pub use config::Settings;
pub use context::AppContext;
pub use services::spider::Spider;
