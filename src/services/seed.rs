//! Seed list ingestion.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::models::{CrawlJob, EnqueueOptions, JobKind};
use crate::onion::{extract_onions, is_onion_url, is_valid_onion_address, normalize_url};
use crate::queue::JobQueue;
use crate::services::spider::CrawlRequest;

/// Result of submitting a seed list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub enqueued: usize,
    pub failed: usize,
}

/// Parse a seed list into normalized, unique URLs.
///
/// One entry per line; lines starting with `#` are comments and only the
/// first comma-separated field is read, so simple CSV exports work. A field
/// containing spaces is free text and contributes every onion host named in
/// it. With `strict`, onion seeds must be valid v3 addresses.
pub fn load_seeds(text: &str, strict: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut seeds = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let field = line
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_matches('"');

        let candidates: Vec<String> = if field.contains(char::is_whitespace) {
            extract_onions(line)
                .iter()
                .filter_map(|host| normalize_url(host))
                .collect()
        } else {
            normalize_url(field).into_iter().collect()
        };
        if candidates.is_empty() {
            debug!("Seed line {} has no usable URL: {:?}", lineno + 1, field);
            continue;
        }

        for url in candidates {
            if strict && is_onion_url(&url) && !is_valid_onion_address(&url) {
                warn!("Seed line {}: {} is not a v3 onion address", lineno + 1, url);
                continue;
            }
            if seen.insert(url.clone()) {
                seeds.push(url);
            }
        }
    }
    seeds
}

/// Enqueue one crawl job per seed.
pub async fn submit_seeds(
    queue: &dyn JobQueue,
    seeds: &[String],
    depth: u32,
    use_proxy: bool,
    options: EnqueueOptions,
) -> SeedReport {
    let mut report = SeedReport::default();
    for seed in seeds {
        let request = CrawlRequest::seed(seed, depth).with_proxy(use_proxy);
        let job = JobKind::Crawl(CrawlJob::from(request));
        match queue.enqueue(&job, options).await {
            Ok(_) => report.enqueued += 1,
            Err(e) => {
                warn!("Failed to enqueue seed {}: {}", seed, e);
                report.failed += 1;
            }
        }
    }
    info!(
        "Submitted {} seed(s) at depth {} ({} failed)",
        report.enqueued, depth, report.failed
    );
    report
}
