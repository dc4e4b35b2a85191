//! Per-run evidence store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::actions::Observation;

/// Observations gathered during one run, keyed by action name.
///
/// Append-only while a run is in progress: repeated executions of the same
/// action add to its list. The agent clears it between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: BTreeMap<String, Vec<Observation>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, action_name: impl Into<String>, observation: Observation) {
        self.entries
            .entry(action_name.into())
            .or_default()
            .push(observation);
    }

    pub fn get(&self, action_name: &str) -> Option<&[Observation]> {
        self.entries.get(action_name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of observations across all actions.
    pub fn observation_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether any action produced content.
    pub fn has_evidence(&self) -> bool {
        self.entries.values().flatten().any(|o| o.success)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pretty JSON for prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_actions_append() {
        let mut context = Context::new();
        context.append("read_webpage_content", Observation::success("a", "https://a"));
        context.append("read_webpage_content", Observation::failure("boom"));
        context.append("read_wiki_entry", Observation::success("w", "https://w"));

        let pages = context.get("read_webpage_content").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].content.as_deref(), Some("a"));
        assert!(!pages[1].success);
        assert_eq!(context.observation_count(), 3);
        assert!(context.has_evidence());
        assert!(context.get("read_youtube_transcript").is_none());
    }

    #[test]
    fn test_prompt_json_shape() {
        let mut context = Context::new();
        assert_eq!(context.to_prompt_json(), "{}");

        context.append("read_wiki_entry", Observation::success("Paris...", "https://w"));
        let value: serde_json::Value = serde_json::from_str(&context.to_prompt_json()).unwrap();
        assert_eq!(value["read_wiki_entry"][0]["content"], "Paris...");

        context.clear();
        assert!(context.is_empty());
        assert!(!context.has_evidence());
    }
}
