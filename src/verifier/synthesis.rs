//! Prompts for the model calls and defensive parsers for their JSON replies.

use serde::Deserialize;
use serde_json::Value;

use super::types::{Confidence, VerdictResult, VoteCheck, VoteMessage};

/// Explanation used when a synthesis reply cannot be used.
pub const PARSE_FAILURE_EXPLANATION: &str = "Failed to parse verification result.";

/// A model reply that violates the expected JSON contract.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value {value} for '{field}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Parse a reply as a JSON object, tolerating a Markdown code fence.
pub fn parse_json_object(text: &str) -> Result<serde_json::Map<String, Value>, ParseError> {
    match serde_json::from_str::<Value>(strip_code_fence(text))? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line; a fence
    // opened and closed on one line has no info string to drop.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn question_prompt(statement: &str) -> String {
    format!(
        "Convert the following statement into a clear and concise yes/no question:\n\n{}",
        statement
    )
}

pub fn statement_prompt(statement: &str, question: &str, context_json: &str) -> String {
    let template = serde_json::json!({
        "statement": statement,
        "result": "Yes/No/Unknown/Too Early",
        "confidence": "Low/Medium/High",
        "explanation": "Provide a concise explanation for your conclusion",
        "sources": ["List of URLs used to gather the context (can be empty if none)"]
    });

    format!(
        r#"As an AI verifier, you are given a statement to verify. The statement has been reformulated into a question to help gather relevant information. Use the context gathered based on this question to verify the original statement.

Statement:
{statement}

Reformulated Question:
{question}

Context (information gathered from actions based on the question):
{context_json}

Note: If the context is insufficient or empty, consider that there may not be enough information to verify the statement. In such cases, you should return "Unknown" as the result.

Based on the context, provide a verification result as a JSON object with the following fields:

{template}
"#,
        template = serde_json::to_string_pretty(&template).unwrap_or_default()
    )
}

pub fn vote_prompt(contract_description: &str, message: &VoteMessage, context_json: &str) -> String {
    let template = serde_json::json!({
        "voted_P": message.p_value,
        "is_correct": "true/false",
        "confidence": "Low/Medium/High",
        "explanation": "Your explanation here."
    });

    format!(
        r#"You are an AI agent tasked with verifying whether the P value provided in a UMA vote is correct based on the contract description and the evidence provided.

Contract Description:
{contract_description}

Vote Message:
user: {user}
timestamp: {timestamp}
P value submitted: {p_value}
evidence: {evidence}
rationale: {rationale}

Context (information gathered from the sources):
{context_json}

Instructions:
- Analyze the contract description and understand the criteria for each P value (P1, P2, P3, P4).
- Evaluate the evidence, context from sources, and rationale provided in the vote message.
- Determine if the submitted P value is correct based on the contract description, evidence, and rationale.
- If the P value is correct, state that it is correct.
- If there is insufficient information to verify, state that the verification is not possible.
- Provide confidence level based on the analysis.
Provide your response as a JSON object in the following format, with "is_correct" as a JSON boolean:

{template}
"#,
        user = message.user.as_deref().unwrap_or("Unknown"),
        timestamp = message.timestamp.as_deref().unwrap_or("Unknown"),
        p_value = message.p_value,
        evidence = message.evidence.as_deref().unwrap_or(""),
        rationale = message.rationale.as_deref().unwrap_or(""),
        template = serde_json::to_string_pretty(&template).unwrap_or_default()
    )
}

/// Verdict fields taken from the synthesis reply.
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictBody {
    pub result: VerdictResult,
    pub confidence: Confidence,
    pub explanation: String,
    /// `None` when the reply omitted `sources` or sent a non-list.
    pub sources: Option<Vec<String>>,
}

/// Parse a statement-synthesis reply.
///
/// `result` is mandatory; a missing `confidence` counts as Low.
pub fn parse_verdict(text: &str) -> Result<VerdictBody, ParseError> {
    let map = parse_json_object(text)?;

    let result = match map.get("result") {
        Some(Value::String(s)) => s.parse::<VerdictResult>().map_err(|_| {
            ParseError::InvalidValue {
                field: "result",
                value: s.clone(),
            }
        })?,
        Some(other) => {
            return Err(ParseError::InvalidValue {
                field: "result",
                value: other.to_string(),
            })
        }
        None => return Err(ParseError::MissingField("result")),
    };

    let confidence = parse_confidence(map.get("confidence"))?;

    let explanation = map
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let sources = match map.get("sources") {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    };

    Ok(VerdictBody {
        result,
        confidence,
        explanation,
        sources,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

/// Parse a vote-synthesis reply. `submitted` fills in a missing `voted_P`.
pub fn parse_vote_check(text: &str, submitted: &str) -> Result<VoteCheck, ParseError> {
    let map = parse_json_object(text)?;

    let is_correct = match map.get("is_correct") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("is_correct")),
        Some(value) => match serde_json::from_value::<Flag>(value.clone()) {
            Ok(Flag::Bool(b)) => b,
            Ok(Flag::Text(s)) if s.trim().eq_ignore_ascii_case("true") => true,
            Ok(Flag::Text(s)) if s.trim().eq_ignore_ascii_case("false") => false,
            _ => {
                return Err(ParseError::InvalidValue {
                    field: "is_correct",
                    value: value.to_string(),
                })
            }
        },
    };

    let voted_value = map
        .get("voted_P")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(submitted)
        .to_string();

    Ok(VoteCheck {
        voted_value,
        is_correct,
        confidence: parse_confidence(map.get("confidence"))?,
        explanation: map
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn parse_confidence(value: Option<&Value>) -> Result<Confidence, ParseError> {
    match value {
        None | Some(Value::Null) => Ok(Confidence::Low),
        Some(Value::String(s)) => s.parse().map_err(|_| ParseError::InvalidValue {
            field: "confidence",
            value: s.clone(),
        }),
        Some(other) => Err(ParseError::InvalidValue {
            field: "confidence",
            value: other.to_string(),
        }),
    }
}
