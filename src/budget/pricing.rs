//! Per-model token pricing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::llm::TokenUsage;

/// Price of one model in US dollars per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Dollar cost of one completion.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 * self.input_per_million / 1_000_000.0
            + usage.completion_tokens as f64 * self.output_per_million / 1_000_000.0
    }
}

/// Mapping from model identifier to pricing.
///
/// Unknown models cost nothing, so cost accounting is advisory for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    models: HashMap<String, ModelPricing>,
}

impl PriceTable {
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    pub fn insert(&mut self, model_id: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model_id.into(), pricing);
    }

    /// Overlay another table on top of this one; entries in `other` win.
    pub fn merge(&mut self, other: PriceTable) {
        self.models.extend(other.models);
    }

    pub fn get(&self, model_id: &str) -> Option<ModelPricing> {
        self.models.get(model_id).copied()
    }

    /// Pricing for a model, zero when the model is not listed.
    pub fn pricing_or_free(&self, model_id: &str) -> ModelPricing {
        self.get(model_id).unwrap_or_else(|| {
            tracing::debug!("No pricing for model {}, counting it as free", model_id);
            ModelPricing::default()
        })
    }

    pub fn cost(&self, model_id: &str, usage: &TokenUsage) -> f64 {
        self.pricing_or_free(model_id).cost(usage)
    }
}

impl Default for PriceTable {
    /// Published Mistral list prices.
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("mistral-large-2407", ModelPricing::new(2.0, 6.0));
        table.insert("mistral-large-latest", ModelPricing::new(2.0, 6.0));
        table.insert("mistral-small-2409", ModelPricing::new(0.2, 0.6));
        table.insert("mistral-small-latest", ModelPricing::new(0.2, 0.6));
        table
    }
}
