//! HTTP client for the external scheduling site
//!
//! Issues exactly one request per call. Rate limiting and retries live in the
//! scraper, which drives this client through the [`PageSource`] trait so tests
//! can substitute canned pages.

use crate::utils::error::FetchError;
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT},
    redirect, Client,
};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 10;

/// Source of raw page bodies
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch `url` once and return the decoded body.
    ///
    /// Non-success statuses are reported as `FetchError::HttpStatus`.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed page source for the scheduling site
pub struct ScheduleClient {
    client: Client,
    base_url: Url,
    /// Fixed user agent; rotates through a built-in pool when `None`
    user_agent: Option<String>,
}

impl ScheduleClient {
    /// Create a client for `base_url` with the default timeout
    ///
    /// # Errors
    ///
    /// `FetchError::InvalidUrl` if `base_url` is not an absolute http(s) URL
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, None)
    }

    /// Create a client with a custom timeout and optional fixed user agent
    ///
    /// # Errors
    ///
    /// `FetchError::InvalidUrl` for a bad base URL, `FetchError::Network` if
    /// the underlying HTTP client cannot be built
    pub fn with_config(
        base_url: &str,
        timeout: Duration,
        user_agent: Option<String>,
    ) -> Result<Self, FetchError> {
        let base_url = Self::validate_base_url(base_url)?;

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::network(base_url.as_str(), &e))?;

        Ok(Self {
            client,
            base_url,
            user_agent,
        })
    }

    fn validate_base_url(base_url: &str) -> Result<Url, FetchError> {
        let url = Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(url),
            _ => Err(FetchError::InvalidUrl(format!(
                "{base_url}: expected an http(s) URL with a host"
            ))),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a relative path against the base URL; absolute URLs pass through
    pub fn resolve(&self, path: &str) -> Result<String, FetchError> {
        self.base_url
            .join(path)
            .map(String::from)
            .map_err(|e| FetchError::InvalidUrl(format!("{path}: {e}")))
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let ua = match &self.user_agent {
            Some(ua) => ua.as_str(),
            None => USER_AGENTS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(USER_AGENTS[0]),
        };
        if let Ok(value) = HeaderValue::from_str(ua) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        headers
    }

    /// Decode a body using the charset from `content_type`, falling back to UTF-8
    pub fn decode_bytes(bytes: &[u8], content_type: &str) -> String {
        let encoding = content_type
            .to_ascii_lowercase()
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("charset=").map(str::to_string))
            .find_map(|label| Encoding::for_label(label.trim_matches('"').as_bytes()))
            .unwrap_or(UTF_8);

        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            debug!(encoding = encoding.name(), "body contained undecodable bytes");
        }
        text.into_owned()
    }
}

#[async_trait]
impl PageSource for ScheduleClient {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let full_url = self.resolve(url)?;
        debug!(url = %full_url, "fetching schedule page");

        let response = self
            .client
            .get(&full_url)
            .headers(self.build_headers())
            .send()
            .await
            .map_err(|e| FetchError::network(&full_url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: full_url,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(&full_url, &e))?;

        Ok(Self::decode_bytes(&bytes, &content_type))
    }
}
