//! Terminal result types and the vote message record.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::budget::UsageSnapshot;

/// Answer to a statement-verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictResult {
    Yes,
    No,
    Unknown,
    #[serde(alias = "Too Early")]
    TooEarly,
}

impl FromStr for VerdictResult {
    type Err = String;

    /// Lenient: case, spaces, underscores and hyphens are ignored, so
    /// "Too Early", "too_early" and "TooEarly" all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "unknown" => Ok(Self::Unknown),
            "tooearly" => Ok(Self::TooEarly),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for VerdictResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "Yes"),
            Self::No => write!(f, "No"),
            Self::Unknown => write!(f, "Unknown"),
            Self::TooEarly => write!(f, "TooEarly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Final answer of `verify_statement`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub statement: String,
    pub result: VerdictResult,
    pub confidence: Confidence,
    pub explanation: String,
    pub sources: Vec<String>,
    pub usage: UsageSnapshot,
}

impl Verdict {
    /// `Unknown` / `Low` verdict used whenever synthesis cannot complete.
    pub fn fallback(
        statement: impl Into<String>,
        explanation: impl Into<String>,
        sources: Vec<String>,
        usage: UsageSnapshot,
    ) -> Self {
        Self {
            statement: statement.into(),
            result: VerdictResult::Unknown,
            confidence: Confidence::Low,
            explanation: explanation.into(),
            sources,
            usage,
        }
    }
}

/// Final answer of `verify_vote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCheck {
    pub voted_value: String,
    pub is_correct: bool,
    pub confidence: Confidence,
    pub explanation: String,
}

impl VoteCheck {
    pub fn fallback(voted_value: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            voted_value: voted_value.into(),
            is_correct: false,
            confidence: Confidence::Low,
            explanation: explanation.into(),
        }
    }
}

/// One vote message from a dispute discussion.
///
/// Field names follow the discussion parser's output; the capitalised
/// `Evidence` / `Rationale` spellings are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Submitted outcome code, e.g. "P1".
    #[serde(rename = "P", default)]
    pub p_value: String,
    #[serde(default, alias = "Evidence")]
    pub evidence: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sources: Vec<String>,
    #[serde(default, alias = "Rationale")]
    pub rationale: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
