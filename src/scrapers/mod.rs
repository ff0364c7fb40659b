//! Fetching and parsing of remote pages.

pub mod extractor;
pub mod http_client;
pub mod retry;

pub use extractor::Extractor;
pub use http_client::{
    resolve_user_agent, FetchError, Fetcher, FetcherConfig, RawResponse, ReqwestTransport,
    Transport,
};
pub use retry::RetryPolicy;
