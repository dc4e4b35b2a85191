//! Evidence-gathering actions and the registry that dispatches them.
//!
//! Every action returns an [`Observation`]. The set of actions is closed
//! ([`ActionKind`]); the planner's catalog is generated by enumerating it.

mod http;
mod webpage;
mod wiki;
mod youtube;

pub use http::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use webpage::{html_to_text, FetchError, FetchPolicy, WebpageReader};
pub use wiki::{page_title_from_url, WikiError, WikiReader};
pub use youtube::{video_id_from_url, TranscriptError, TranscriptReader};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Uniform result of one action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub success: bool,
    pub content: Option<String>,
    pub source_url: Option<String>,
    pub error: Option<String>,
}

impl Observation {
    pub fn success(content: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            source_url: Some(source_url.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            source_url: None,
            error: Some(error.into()),
        }
    }
}

/// The closed set of actions the planner may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    ReadWikiEntry,
    ReadYoutubeTranscript,
    ReadWebpageContent,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::ReadWikiEntry,
        ActionKind::ReadYoutubeTranscript,
        ActionKind::ReadWebpageContent,
    ];

    /// Stable name used in plans and in the Context.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadWikiEntry => "read_wiki_entry",
            Self::ReadYoutubeTranscript => "read_youtube_transcript",
            Self::ReadWebpageContent => "read_webpage_content",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ReadWikiEntry => {
                "Reads the summary of a Wikipedia entry from a given Wikipedia URL."
            }
            Self::ReadYoutubeTranscript => {
                "Retrieves the transcript of a YouTube video from a given YouTube URL. \
                 Applicable only to YouTube links."
            }
            Self::ReadWebpageContent => {
                "Fetches and extracts the text content from a webpage URL."
            }
        }
    }

    /// Parameters the action accepts. `url` is always required.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            Self::ReadWikiEntry | Self::ReadWebpageContent => &["url", "max_chars"],
            Self::ReadYoutubeTranscript => &["url"],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named parameters of one planned action.
///
/// Values come from model output, so numbers may arrive as strings and
/// vice versa; the typed accessors accept both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionParams(BTreeMap<String, Value>);

impl ActionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::new().with("url", url.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Required `url` parameter.
    pub fn require_url(&self) -> anyhow::Result<&str> {
        match self.0.get("url") {
            Some(Value::String(url)) if !url.trim().is_empty() => Ok(url.trim()),
            Some(other) => anyhow::bail!("parameter 'url' must be a non-empty string, got {}", other),
            None => anyhow::bail!("missing required parameter 'url'"),
        }
    }

    /// Optional `max_chars` parameter; `null` counts as absent.
    pub fn max_chars(&self) -> anyhow::Result<Option<usize>> {
        match self.0.get("max_chars") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| anyhow::anyhow!("parameter 'max_chars' must be a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| anyhow::anyhow!("parameter 'max_chars' is not an integer: {:?}", s)),
            Some(other) => anyhow::bail!("parameter 'max_chars' must be an integer, got {}", other),
        }
    }

    /// Reject parameters the action does not declare.
    pub fn ensure_only(&self, allowed: &[&str]) -> anyhow::Result<()> {
        if let Some(unexpected) = self.keys().find(|k| !allowed.contains(k)) {
            anyhow::bail!("unexpected parameter '{}'", unexpected);
        }
        Ok(())
    }
}

/// Cut `text` to at most `max_chars` characters. A cap of zero means no cap.
pub(crate) fn truncate_chars(text: String, max_chars: Option<usize>) -> String {
    match max_chars {
        Some(max) if max > 0 => match text.char_indices().nth(max) {
            Some((idx, _)) => text[..idx].to_string(),
            None => text,
        },
        _ => text,
    }
}

/// An executable action.
///
/// Expected failures (HTTP errors, missing pages) come back as a failed
/// `Observation`; `Err` is reserved for faults such as bad parameters, and
/// the registry converts those into failed observations as well.
#[async_trait]
pub trait Action: Send + Sync {
    fn kind(&self) -> ActionKind;

    async fn execute(&self, params: &ActionParams) -> anyhow::Result<Observation>;
}

/// Registry of available actions, keyed by kind.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<ActionKind, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in fetchers sharing one transport.
    pub fn with_defaults(transport: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WikiReader::new(transport.clone())));
        registry.register(Arc::new(TranscriptReader::new(transport.clone())));
        registry.register(Arc::new(WebpageReader::new(transport, FetchPolicy::default())));
        registry
    }

    /// Register an action, replacing any previous action of the same kind.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.kind(), action);
    }

    /// `(name, description)` of every registered action, in kind order.
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        self.actions
            .keys()
            .map(|kind| (kind.name(), kind.description()))
            .collect()
    }

    /// Catalog text handed to the planner.
    pub fn catalog(&self) -> String {
        self.describe()
            .into_iter()
            .map(|(name, description)| format!("- {}: {}", name, description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run the action called `name`.
    ///
    /// Unknown names yield `None`. Faults inside a known action are folded
    /// into a failed observation so one bad step never aborts a plan.
    pub async fn dispatch(&self, name: &str, params: &ActionParams) -> Option<Observation> {
        let Some(action) = ActionKind::from_name(name).and_then(|kind| self.actions.get(&kind))
        else {
            tracing::warn!("Action {} not available", name);
            return None;
        };

        let kind = action.kind();
        if let Err(e) = params.ensure_only(kind.parameters()) {
            tracing::warn!("Rejected parameters for action {}: {}", kind, e);
            return Some(Observation::failure(format!("{}: {}", kind, e)));
        }

        match action.execute(params).await {
            Ok(observation) => Some(observation),
            Err(e) => {
                tracing::warn!("Error during action {}: {:#}", kind, e);
                Some(Observation::failure(format!("{:#}", e)))
            }
        }
    }
}
