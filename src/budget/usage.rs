//! Running latency, token and cost totals for one verification run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::pricing::PriceTable;
use crate::llm::ChatResponse;

/// Point-in-time totals for a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub elapsed_seconds: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

/// Accumulates usage across every model call of a run.
///
/// All mutation is additive, so snapshots taken during a run never decrease.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    model: String,
    prices: PriceTable,
    elapsed: Duration,
    prompt_tokens: u64,
    completion_tokens: u64,
    cost_usd: f64,
    calls: u32,
}

impl UsageTracker {
    /// Track calls made against `model`, priced with `prices`.
    pub fn new(model: impl Into<String>, prices: PriceTable) -> Self {
        Self {
            model: model.into(),
            prices,
            elapsed: Duration::ZERO,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: 0.0,
            calls: 0,
        }
    }

    /// Account one model call that took `elapsed`.
    pub fn record(&mut self, response: &ChatResponse, elapsed: Duration) {
        self.elapsed += elapsed;
        self.calls += 1;

        let Some(usage) = response.usage else {
            tracing::warn!("No usage data available in the response.");
            return;
        };

        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(usage.completion_tokens);
        self.cost_usd += self.prices.cost(&self.model, &usage);
    }

    /// Account time spent in a non-model external call (search, fetch).
    pub fn add_elapsed(&mut self, elapsed: Duration) {
        self.elapsed += elapsed;
    }

    /// Number of model calls recorded so far.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            elapsed_seconds: round_to(self.elapsed.as_secs_f64(), 2),
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            cost_usd: round_to(self.cost_usd, 4),
        }
    }

    /// Start a new run; keeps the model and price table.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
        self.prompt_tokens = 0;
        self.completion_tokens = 0;
        self.cost_usd = 0.0;
        self.calls = 0;
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;

    fn response(prompt: u64, completion: u64) -> ChatResponse {
        ChatResponse {
            content: Some("ok".to_string()),
            usage: Some(TokenUsage::new(prompt, completion)),
            ..ChatResponse::default()
        }
    }

    #[test]
    fn test_record_accumulates() {
        let mut tracker = UsageTracker::new("mistral-large-latest", PriceTable::default());
        tracker.record(&response(100_000, 10_000), Duration::from_millis(1500));
        tracker.record(&response(50_000, 5_000), Duration::from_millis(500));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.prompt_tokens, 150_000);
        assert_eq!(snapshot.completion_tokens, 15_000);
        assert_eq!(snapshot.elapsed_seconds, 2.0);
        // 0.15M * $2 + 0.015M * $6
        assert!((snapshot.cost_usd - 0.39).abs() < 1e-9);
        assert_eq!(tracker.calls(), 2);
    }

    #[test]
    fn test_missing_usage_only_adds_time() {
        let mut tracker = UsageTracker::new("mistral-small-latest", PriceTable::default());
        tracker.record(&ChatResponse::default(), Duration::from_secs(1));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.prompt_tokens, 0);
        assert_eq!(snapshot.cost_usd, 0.0);
        assert_eq!(snapshot.elapsed_seconds, 1.0);
    }

    #[test]
    fn test_snapshots_never_decrease() {
        let mut tracker = UsageTracker::new("mistral-small-latest", PriceTable::default());
        let mut previous = tracker.snapshot();

        let steps = [
            Some(response(10, 2)),
            None,
            Some(ChatResponse::default()),
            Some(response(3_000, 900)),
        ];
        for step in steps {
            match step {
                Some(r) => tracker.record(&r, Duration::from_millis(40)),
                None => tracker.add_elapsed(Duration::from_millis(250)),
            }
            let current = tracker.snapshot();
            assert!(current.elapsed_seconds >= previous.elapsed_seconds);
            assert!(current.prompt_tokens >= previous.prompt_tokens);
            assert!(current.completion_tokens >= previous.completion_tokens);
            assert!(current.cost_usd >= previous.cost_usd);
            previous = current;
        }
    }

    #[test]
    fn test_reset_and_wire_names() {
        let mut tracker = UsageTracker::new("mistral-small-latest", PriceTable::default());
        tracker.record(&response(10, 2), Duration::from_secs(3));
        tracker.reset();
        assert_eq!(tracker.snapshot(), UsageSnapshot::default());

        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        for key in ["elapsedSeconds", "promptTokens", "completionTokens", "costUSD"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
