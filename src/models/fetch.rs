//! Result of a single proxied fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status reported when the remote never produced a usable response.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// How a fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// 200 with a decoded body.
    Ok,
    /// The server answered with something other than 200.
    HttpStatus(u16),
    /// Every attempt failed at the transport level.
    Unreachable,
    /// The server answered 200 but the body was not valid UTF-8.
    Undecodable,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::HttpStatus(_) => "http_status",
            Self::Unreachable => "unreachable",
            Self::Undecodable => "undecodable",
        }
    }
}

/// Outcome of one fetch. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Final URL after redirects, or the requested URL on failure.
    pub url: String,
    pub status: Option<u16>,
    /// Decoded response text; only present for status 200.
    pub body: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
    pub attempts: u32,
}

impl FetchResult {
    /// A successful 200 response with a decoded body.
    pub fn success(url: impl Into<String>, body: String, attempts: u32) -> Self {
        Self {
            url: url.into(),
            status: Some(200),
            body: Some(body),
            observed_at: Utc::now(),
            outcome: FetchOutcome::Ok,
            attempts,
        }
    }

    /// A response whose status is kept but whose body is discarded.
    pub fn status_only(url: impl Into<String>, status: u16, attempts: u32) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            body: None,
            observed_at: Utc::now(),
            outcome: FetchOutcome::HttpStatus(status),
            attempts,
        }
    }

    /// Transport failed on every attempt.
    pub fn unreachable(url: impl Into<String>, attempts: u32) -> Self {
        Self {
            url: url.into(),
            status: Some(UNAVAILABLE_STATUS),
            body: None,
            observed_at: Utc::now(),
            outcome: FetchOutcome::Unreachable,
            attempts,
        }
    }

    /// Body arrived but could not be decoded.
    pub fn undecodable(url: impl Into<String>, attempts: u32) -> Self {
        Self {
            url: url.into(),
            status: Some(UNAVAILABLE_STATUS),
            body: None,
            observed_at: Utc::now(),
            outcome: FetchOutcome::Undecodable,
            attempts,
        }
    }

    /// True when there is HTML worth extracting.
    pub fn has_content(&self) -> bool {
        self.status.is_some() && self.body.is_some()
    }
}
