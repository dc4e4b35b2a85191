//! Wikipedia summary lookup.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use super::http::HttpTransport;
use super::{truncate_chars, Action, ActionKind, ActionParams, Observation};

const DEFAULT_HOST: &str = "en.wikipedia.org";

/// Why a summary could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WikiError {
    #[error("DisambiguationError: \"{0}\" may refer to several pages")]
    Disambiguation(String),
    #[error("PageError: Page id \"{0}\" does not match any pages")]
    PageNotFound(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Page title from the last path segment of a Wikipedia URL, percent-decoded.
pub fn page_title_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let title = urlencoding::decode(segment).ok()?.into_owned();
    Some(title)
}

/// Reads page summaries through the Wikipedia REST API.
pub struct WikiReader {
    transport: Arc<dyn HttpTransport>,
}

impl WikiReader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Summary endpoint on the same language edition as `url`.
    fn summary_endpoint(url: &str, title: &str) -> String {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .filter(|h| h.ends_with("wikipedia.org"))
            .map(|h| h.replace(".m.wikipedia.org", ".wikipedia.org"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        format!(
            "https://{}/api/rest_v1/page/summary/{}",
            host,
            urlencoding::encode(&title.replace(' ', "_"))
        )
    }

    /// Fetch the summary for the page `url` points at.
    ///
    /// Returns the (possibly truncated) summary and the canonical page URL.
    pub async fn read(
        &self,
        url: &str,
        max_chars: Option<usize>,
    ) -> Result<(String, String), WikiError> {
        let title = page_title_from_url(url)
            .ok_or_else(|| WikiError::Unexpected(format!("no page title in {}", url)))?;

        let endpoint = Self::summary_endpoint(url, &title);
        tracing::debug!("Fetching wiki summary: {}", endpoint);

        let response = self
            .transport
            .get(&endpoint)
            .await
            .map_err(|e| WikiError::Unexpected(e.to_string()))?;

        if response.status == 404 {
            return Err(WikiError::PageNotFound(title));
        }
        if !response.is_success() {
            return Err(WikiError::Unexpected(format!(
                "HTTP {} from {}",
                response.status, endpoint
            )));
        }

        let summary: WikiSummary = serde_json::from_str(&response.body)
            .map_err(|e| WikiError::Unexpected(format!("invalid summary response: {}", e)))?;

        if summary.page_type == "disambiguation" {
            return Err(WikiError::Disambiguation(summary.title.unwrap_or(title)));
        }

        let page_url = summary
            .content_urls
            .and_then(|c| c.desktop)
            .map(|d| d.page)
            .unwrap_or_else(|| url.to_string());

        Ok((truncate_chars(summary.extract, max_chars), page_url))
    }
}

#[async_trait]
impl Action for WikiReader {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadWikiEntry
    }

    async fn execute(&self, params: &ActionParams) -> anyhow::Result<Observation> {
        let url = params.require_url()?;
        let max_chars = params.max_chars()?;

        Ok(match self.read(url, max_chars).await {
            Ok((summary, page_url)) => Observation::success(summary, page_url),
            Err(e) => Observation::failure(e.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WikiSummary {
    #[serde(rename = "type", default)]
    page_type: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{HttpResponse, TransportError};
    use std::sync::Mutex;

    struct FixedTransport {
        response: HttpResponse,
        requested: Mutex<Vec<String>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: HttpResponse::new(status, body),
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for FixedTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(self.response.clone())
        }
    }

    #[test]
    fn test_page_title_from_url() {
        assert_eq!(
            page_title_from_url("https://en.wikipedia.org/wiki/Caf%C3%A9_au_lait").as_deref(),
            Some("Café_au_lait")
        );
        assert_eq!(
            page_title_from_url("https://fr.wikipedia.org/wiki/Paris/").as_deref(),
            Some("Paris")
        );
        assert_eq!(page_title_from_url("not a url"), None);
    }

    #[tokio::test]
    async fn test_summary_is_truncated_and_canonical_url_reported() {
        let transport = FixedTransport::new(
            200,
            r#"{"type": "standard", "title": "Paris",
                "extract": "Paris is the capital and largest city of France.",
                "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Paris"}}}"#,
        );
        let reader = WikiReader::new(transport.clone());

        let params = ActionParams::url("https://en.m.wikipedia.org/wiki/Paris").with("max_chars", 5);
        let observation = reader.execute(&params).await.unwrap();

        assert!(observation.success);
        assert_eq!(observation.content.as_deref(), Some("Paris"));
        assert_eq!(
            observation.source_url.as_deref(),
            Some("https://en.wikipedia.org/wiki/Paris")
        );
        assert_eq!(
            transport.requested.lock().unwrap()[0],
            "https://en.wikipedia.org/api/rest_v1/page/summary/Paris"
        );
    }

    #[tokio::test]
    async fn test_zero_max_chars_keeps_full_summary() {
        let reader = WikiReader::new(FixedTransport::new(
            200,
            r#"{"type": "standard", "title": "Paris",
                "extract": "Paris is the capital and largest city of France."}"#,
        ));

        let params = ActionParams::url("https://en.wikipedia.org/wiki/Paris").with("max_chars", 0);
        let observation = reader.execute(&params).await.unwrap();

        assert!(observation.success);
        assert_eq!(
            observation.content.as_deref(),
            Some("Paris is the capital and largest city of France.")
        );
        // No canonical URL in the response: the requested page is reported.
        assert_eq!(
            observation.source_url.as_deref(),
            Some("https://en.wikipedia.org/wiki/Paris")
        );
    }

    #[tokio::test]
    async fn test_disambiguation_and_missing_pages_are_distinct() {
        let ambiguous = WikiReader::new(FixedTransport::new(
            200,
            r#"{"type": "disambiguation", "title": "Mercury", "extract": "Mercury may refer to:"}"#,
        ));
        let err = ambiguous
            .read("https://en.wikipedia.org/wiki/Mercury", None)
            .await
            .unwrap_err();
        assert_eq!(err, WikiError::Disambiguation("Mercury".into()));
        assert!(err.to_string().starts_with("DisambiguationError"));

        let missing = WikiReader::new(FixedTransport::new(404, "{}"));
        let err = missing
            .read("https://en.wikipedia.org/wiki/Atlantis_(city)", None)
            .await
            .unwrap_err();
        assert_eq!(err, WikiError::PageNotFound("Atlantis_(city)".into()));
        assert!(err.to_string().starts_with("PageError"));
    }
}
