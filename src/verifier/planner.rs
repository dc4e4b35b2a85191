//! Action planning: one model call turning a query and links into an
//! ordered list of actions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::TrackedModel;
use super::outcome::Outcome;
use super::synthesis::{parse_json_object, ParseError};
use crate::actions::{ActionParams, ActionRegistry};
use crate::budget::UsageTracker;
use crate::llm::ChatOptions;

/// One step of an action plan.
///
/// `action_name` is not checked against the registry here; unknown names
/// are tolerated and skipped at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_name: String,
    #[serde(default)]
    pub params: ActionParams,
    #[serde(default)]
    pub reason: String,
}

/// Plans actions using the registry's catalog.
pub struct ActionPlanner<'a> {
    model: &'a TrackedModel,
    registry: &'a ActionRegistry,
}

impl<'a> ActionPlanner<'a> {
    pub fn new(model: &'a TrackedModel, registry: &'a ActionRegistry) -> Self {
        Self { model, registry }
    }

    /// Produce a plan for `query` over `links`.
    ///
    /// Never fails: no links, a failed call or an unusable reply all give an
    /// empty (degraded) plan. The planning call is not retried.
    pub async fn plan(
        &self,
        query: &str,
        links: &[String],
        usage: &mut UsageTracker,
    ) -> Outcome<Vec<PlannedAction>> {
        if links.is_empty() {
            return Outcome::degraded(Vec::new(), "no links to plan over");
        }

        let prompt = plan_prompt(&self.registry.catalog(), query, links);
        tracing::debug!("Action descriptions: {}", self.registry.catalog());

        match self.model.complete(&prompt, ChatOptions::json(), usage).await {
            Ok(reply) => parse_plan(&reply),
            Err(e) => {
                tracing::warn!("Planning call failed: {:#}", e);
                Outcome::degraded(Vec::new(), format!("planning call failed: {}", e))
            }
        }
    }
}

fn plan_prompt(catalog: &str, query: &str, links: &[String]) -> String {
    format!(
        r#"As an AI agent, plan a sequence of actions to verify the following query based on the provided links.
You have the following actions available:
{catalog}

Each action should be applicable to a link, and you can determine the appropriate action based on the link type.

Query:
{query}

Links:
{links}

Return your plan as a JSON object with an "action_plan" key containing a list of actions.
Each action should have "action_name", "params", and "reason" fields.

Example:
{{
    "action_plan": [
        {{"action_name": "read_wiki_entry", "params": {{"url": "link1"}}, "reason": "Reason for choosing this action for link1"}},
        {{"action_name": "read_webpage_content", "params": {{"url": "link2"}}, "reason": "Reason for choosing this action for link2"}}
    ]
}}
"#,
        links = links.join("\n")
    )
}

/// Parse a planning reply.
///
/// Invalid JSON or a missing/non-array `action_plan` gives an empty plan.
/// Individual malformed steps are dropped and the plan is marked degraded.
pub fn parse_plan(reply: &str) -> Outcome<Vec<PlannedAction>> {
    let steps = match parse_json_object(reply) {
        Ok(mut map) => match map.remove("action_plan") {
            Some(Value::Array(steps)) => steps,
            Some(_) => {
                return reject(ParseError::InvalidValue {
                    field: "action_plan",
                    value: "non-array".to_string(),
                })
            }
            None => return reject(ParseError::MissingField("action_plan")),
        },
        Err(e) => return reject(e),
    };

    let total = steps.len();
    let mut plan = Vec::with_capacity(total);
    for step in steps {
        match parse_step(step) {
            Ok(action) => plan.push(action),
            Err(e) => tracing::warn!("Dropping malformed plan step: {}", e),
        }
    }

    if plan.len() < total {
        let dropped = total - plan.len();
        Outcome::degraded(plan, format!("{} malformed plan step(s) dropped", dropped))
    } else {
        Outcome::Complete(plan)
    }
}

fn parse_step(mut step: Value) -> Result<PlannedAction, serde_json::Error> {
    // Models sometimes send `"params": null`; treat it as no parameters.
    if let Some(obj) = step.as_object_mut() {
        if obj.get("params").map_or(false, Value::is_null) {
            obj.remove("params");
        }
    }
    serde_json::from_value(step)
}

fn reject(error: ParseError) -> Outcome<Vec<PlannedAction>> {
    tracing::warn!("Failed to parse action plan: {}", error);
    Outcome::degraded(Vec::new(), format!("failed to parse action plan: {}", error))
}
