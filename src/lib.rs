//! # Truth Agent
//!
//! Verifies natural-language statements and contract-outcome votes against
//! evidence gathered from the web.
//!
//! ## Pipeline
//!
//! ```text
//!   statement ──► formulate question ──► web search ──► plan actions
//!                                                           │
//!        ┌──────────────────────────────────────────────────┘
//!        ▼
//!   execute plan ──► Context (observations per action) ──► synthesize
//!                                                              │
//!                                                              ▼
//!                                                  Verdict / VoteCheck
//! ```
//!
//! A vote check skips the first two steps and plans over the vote's own
//! source links. Every model call is charged to a per-run usage tracker.
//!
//! ## Modules
//! - `verifier`: the agent, its context, prompts and reply parsers
//! - `actions`: evidence fetchers (Wikipedia, YouTube transcripts, web pages)
//! - `search`: web search providers
//! - `llm`: completion clients
//! - `budget`: model pricing and usage accounting
//! - `config`: environment and settings-file configuration

pub mod actions;
pub mod budget;
pub mod config;
pub mod llm;
pub mod search;
pub mod verifier;

pub use config::Config;
pub use verifier::{Confidence, Verdict, VerdictResult, VerifierAgent, VoteCheck, VoteMessage};
