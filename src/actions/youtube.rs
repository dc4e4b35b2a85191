//! YouTube transcript lookup.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use url::Url;

use super::http::{HttpTransport, TransportError};
use super::{Action, ActionKind, ActionParams, Observation};

const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";
const TRANSCRIPT_LANG: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("could not find a video id in {0}")]
    MissingVideoId(String),
    #[error("no transcript available for video {0}")]
    Unavailable(String),
    #[error("HTTP {0} from transcript service")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Video id from the `v` query parameter, falling back to the last path
/// segment (`youtu.be/<id>`, `/shorts/<id>`, `/embed/<id>`).
pub fn video_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        if !id.is_empty() {
            return Some(id.into_owned());
        }
    }
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Reads video transcripts from the public timedtext endpoint.
pub struct TranscriptReader {
    transport: Arc<dyn HttpTransport>,
}

impl TranscriptReader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Transcript text with segments joined by single spaces.
    pub async fn read(&self, url: &str) -> Result<String, TranscriptError> {
        let video_id =
            video_id_from_url(url).ok_or_else(|| TranscriptError::MissingVideoId(url.into()))?;

        let endpoint = format!(
            "{}?lang={}&v={}",
            TIMEDTEXT_URL,
            TRANSCRIPT_LANG,
            urlencoding::encode(&video_id)
        );
        let response = self.transport.get(&endpoint).await?;
        if !response.is_success() {
            return Err(TranscriptError::Status(response.status));
        }

        let segments = transcript_segments(&response.body);
        if segments.is_empty() {
            return Err(TranscriptError::Unavailable(video_id));
        }
        Ok(segments.join(" "))
    }
}

#[async_trait]
impl Action for TranscriptReader {
    fn kind(&self) -> ActionKind {
        ActionKind::ReadYoutubeTranscript
    }

    async fn execute(&self, params: &ActionParams) -> anyhow::Result<Observation> {
        let url = params.require_url()?;

        Ok(match self.read(url).await {
            Ok(text) => Observation::success(text, url),
            Err(e) => Observation::failure(format!("Error fetching transcript: {}", e)),
        })
    }
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").expect("valid regex"))
}

/// Decoded text of every `<text>` element in a timedtext document.
fn transcript_segments(xml: &str) -> Vec<String> {
    segment_regex()
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| xml_decode(m.as_str()))
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Entity decoding; `&amp;` first because captions arrive double-escaped.
fn xml_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
