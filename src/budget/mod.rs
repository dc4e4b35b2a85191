//! Budget module - cost tracking and model pricing.
//!
//! # Key Concepts
//! - Pricing: dollars per million input/output tokens, per model
//! - Usage: elapsed time, token totals and cost accumulated over a run

mod pricing;
mod usage;

pub use pricing::{ModelPricing, PriceTable};
pub use usage::{UsageSnapshot, UsageTracker};
