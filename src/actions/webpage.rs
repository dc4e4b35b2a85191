//! Generic webpage fetch with a bounded retry budget.

use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;

use super::http::{HttpTransport, TransportError};
use super::{truncate_chars, Action, ActionKind, ActionParams, Observation};

/// Attempt budget for webpage fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay after a transport failure.
    pub retry_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Terminal outcome of a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Access forbidden (403). The website may be blocking automated access: {url}")]
    Forbidden { url: String },
    #[error("HTTP Error: {status} for url: {url}")]
    Status { status: u16, url: String },
    #[error("Failed to fetch the webpage after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },
}

/// Reads the visible text of a webpage.
pub struct WebpageReader {
    transport: Arc<dyn HttpTransport>,
    policy: FetchPolicy,
}

impl WebpageReader {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: FetchPolicy) -> Self {
        Self { transport, policy }
    }

    /// Fetch `url` and flatten it to text.
    ///
    /// HTTP error statuses end the fetch immediately; only transport
    /// failures are retried.
    pub async fn read(&self, url: &str, max_chars: Option<usize>) -> Result<String, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.transport.get(url).await {
                Ok(response) if response.is_success() => {
                    if attempt > 1 {
                        tracing::debug!("Fetched {} on attempt {}", url, attempt);
                    }
                    return Ok(truncate_chars(html_to_text(&response.body), max_chars));
                }
                Ok(response) if response.status == 403 => {
                    return Err(FetchError::Forbidden {
                        url: url.to_string(),
                    });
                }
                Ok(response) => {
                    return Err(FetchError::Status {
                        status: response.status,
                        url: url.to_string(),
                    });
                }
                Err(error) if attempt < attempts => {
                    tracing::warn!(
                        "Fetch attempt {}/{} for {} failed, retrying in {:?}: {}",
                        attempt,
                        attempts,
                        url,
                        self.policy.retry_delay,
                        error
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(FetchError::Exhausted {
                        attempts,
                        last: error,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Action for WebpageReader {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadWebpageContent
    }

    async fn execute(&self, params: &ActionParams) -> anyhow::Result<Observation> {
        let url = params.require_url()?;
        let max_chars = params.max_chars()?;

        Ok(match self.read(url, max_chars).await {
            Ok(text) => Observation::success(text, url),
            Err(e) => Observation::failure(e.to_string()),
        })
    }
}

/// Extract readable text from HTML.
///
/// Drops `script` and `style` content, emits one text fragment per line,
/// splits on runs of double spaces and discards blank fragments.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut fragments: Vec<&str> = Vec::new();
    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |el| matches!(el.name(), "script" | "style"))
        });
        if hidden {
            continue;
        }
        fragments.extend(
            text.lines()
                .flat_map(|line| line.split("  "))
                .map(str::trim)
                .filter(|chunk| !chunk.is_empty()),
        );
    }

    fragments.join("\n")
}
