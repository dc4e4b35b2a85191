//! Verifier agent: the question → search → plan → execute → synthesize
//! pipeline and its two entry points.
//!
//! The agent owns the per-run [`Context`] and [`UsageTracker`]. Both are
//! reset when a run starts and stay readable afterwards until the next run,
//! so one agent must not be shared between concurrent runs; create one agent
//! per run instead (clients are shared through `Arc`).

mod context;
mod events;
mod model;
mod outcome;
mod planner;
mod synthesis;
mod types;

pub use context::Context;
pub use model::TrackedModel;
pub use outcome::Outcome;
pub use planner::{parse_plan, ActionPlanner, PlannedAction};
pub use synthesis::{
    parse_json_object, parse_verdict, parse_vote_check, ParseError, VerdictBody,
    PARSE_FAILURE_EXPLANATION,
};
pub use types::{Confidence, Verdict, VerdictResult, VoteCheck, VoteMessage};

use anyhow::Context as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::actions::{ActionRegistry, Observation, ReqwestTransport};
use crate::budget::{PriceTable, UsageSnapshot, UsageTracker};
use crate::config::Config;
use crate::llm::{ChatOptions, LlmClient, MistralClient};
use crate::search::{BraveSearch, WebSearch};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "mistral-small-latest";

/// Number of search links handed to the planner.
pub const DEFAULT_SEARCH_RESULTS: usize = 3;

/// Planner query used for a vote's own evidence links.
const VOTE_SOURCES_QUERY: &str = "Fetch more context from the sources";

/// Orchestrates verification runs.
pub struct VerifierAgent {
    model: TrackedModel,
    search: Arc<dyn WebSearch>,
    registry: ActionRegistry,
    search_results: usize,
    context: Context,
    usage: UsageTracker,
    links: Vec<String>,
}

impl VerifierAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn WebSearch>,
        registry: ActionRegistry,
        model: impl Into<String>,
        prices: PriceTable,
    ) -> Self {
        let model = model.into();
        tracing::info!("Verifier agent initialized with model: {}", model);

        Self {
            usage: UsageTracker::new(model.clone(), prices),
            model: TrackedModel::new(llm, model),
            search,
            registry,
            search_results: DEFAULT_SEARCH_RESULTS,
            context: Context::new(),
            links: Vec::new(),
        }
    }

    /// Agent wired to Mistral, Brave search and the built-in fetchers.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?);
        let llm = Arc::new(MistralClient::new(config.mistral_api_key.clone()));
        let search = Arc::new(BraveSearch::new(config.brave_api_key.clone()));

        Ok(Self::new(
            llm,
            search,
            ActionRegistry::with_defaults(transport),
            config.model.clone(),
            config.prices.clone(),
        )
        .with_search_results(config.search_results))
    }

    pub fn with_search_results(mut self, count: usize) -> Self {
        self.search_results = count;
        self
    }

    /// Evidence of the current (or most recent) run.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Usage of the current (or most recent) run.
    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Discard the context, usage totals and links of the previous run.
    pub fn reset(&mut self) {
        self.context.clear();
        self.usage.reset();
        self.links.clear();
    }

    /// Turn a statement into a yes/no question.
    ///
    /// Falls back to the statement itself if the call fails.
    pub async fn formulate_question(&mut self, statement: &str) -> String {
        let prompt = synthesis::question_prompt(statement);

        match self
            .model
            .complete(&prompt, ChatOptions::default(), &mut self.usage)
            .await
        {
            Ok(question) if !question.is_empty() => {
                events::log_event("Formulate Question", statement, &question, true);
                question
            }
            Ok(_) => {
                tracing::warn!("Empty question from model, using the statement as-is");
                statement.to_string()
            }
            Err(e) => {
                tracing::warn!("Question formulation failed, using the statement as-is: {:#}", e);
                statement.to_string()
            }
        }
    }

    /// Top search links for `question`; empty when the provider fails.
    pub async fn perform_web_search(&mut self, question: &str) -> Vec<String> {
        let start = Instant::now();
        let result = self.search.search(question, self.search_results).await;
        self.usage.add_elapsed(start.elapsed());

        let links: Vec<String> = match result {
            Ok(hits) => hits
                .into_iter()
                .take(self.search_results)
                .map(|hit| hit.url)
                .collect(),
            Err(e) => {
                tracing::error!("Web search failed: {:#}", e);
                Vec::new()
            }
        };

        events::log_event("Web Search", question, &links, true);
        self.links = links.clone();
        links
    }

    pub async fn plan_actions(&mut self, query: &str, links: &[String]) -> Outcome<Vec<PlannedAction>> {
        let planner = ActionPlanner::new(&self.model, &self.registry);
        let outcome = planner.plan(query, links, &mut self.usage).await;

        match outcome.reason() {
            Some(reason) => events::log_event(
                "Plan Actions",
                serde_json::json!({"question": query, "links": links}),
                format!("Empty or partial plan: {}", reason),
                true,
            ),
            None => events::log_event(
                "Plan Actions",
                serde_json::json!({"question": query, "links": links}),
                outcome.value(),
                true,
            ),
        }
        outcome
    }

    /// Run one planned action and append its observation to the context.
    ///
    /// Returns `None` (and leaves the context untouched) for unknown actions.
    pub async fn take_action(&mut self, action: &PlannedAction) -> Option<Observation> {
        tracing::info!(
            "Taking action: {} with params: {}",
            action.action_name,
            serde_json::to_string(&action.params).unwrap_or_default()
        );

        let start = Instant::now();
        let observation = self
            .registry
            .dispatch(&action.action_name, &action.params)
            .await;
        self.usage.add_elapsed(start.elapsed());

        let observation = observation?;
        self.context
            .append(action.action_name.clone(), observation.clone());
        events::log_event(
            &format!("Action Taken: {}", action.action_name),
            &action.params,
            &observation,
            false,
        );
        Some(observation)
    }

    /// Execute a plan in order. Failures stay local to their own step.
    pub async fn execute_plan(&mut self, plan: &[PlannedAction]) {
        for action in plan {
            self.take_action(action).await;
        }
    }

    /// Verify a statement. Always returns a well-formed verdict.
    pub async fn verify_statement(&mut self, statement: &str) -> Verdict {
        let span = tracing::info_span!("verify_statement", run_id = %Uuid::new_v4());
        self.run_statement(statement).instrument(span).await
    }

    /// [`verify_statement`](Self::verify_statement) bounded by `deadline`.
    ///
    /// On expiry the in-flight call is dropped and an `Unknown` verdict is
    /// returned with the usage accrued so far.
    pub async fn verify_statement_within(&mut self, statement: &str, deadline: Duration) -> Verdict {
        let result = tokio::time::timeout(deadline, self.verify_statement(statement)).await;
        match result {
            Ok(verdict) => verdict,
            Err(_) => {
                tracing::warn!("Verification exceeded its {:?} deadline", deadline);
                Verdict::fallback(
                    statement,
                    format!("Verification timed out after {}s.", deadline.as_secs_f64()),
                    self.links.clone(),
                    self.usage.snapshot(),
                )
            }
        }
    }

    async fn run_statement(&mut self, statement: &str) -> Verdict {
        self.reset();

        let question = self.formulate_question(statement).await;

        let links = self.perform_web_search(&question).await;
        if links.is_empty() {
            tracing::warn!("No search results found.");
        }

        let plan = self.plan_actions(&question, &links).await.into_value();
        if plan.is_empty() {
            tracing::warn!("No action plan determined for verification.");
        }

        self.execute_plan(&plan).await;

        self.synthesize_verdict(statement, &question, &links)
            .await
            .into_value()
    }

    /// Final synthesis call for a statement run.
    pub async fn synthesize_verdict(
        &mut self,
        statement: &str,
        question: &str,
        links: &[String],
    ) -> Outcome<Verdict> {
        if !self.context.has_evidence() {
            tracing::debug!("Context holds no usable evidence, expecting an Unknown verdict");
        }
        let prompt = synthesis::statement_prompt(statement, question, &self.context.to_prompt_json());

        let reply = match self
            .model
            .complete(&prompt, ChatOptions::json(), &mut self.usage)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Verification call failed: {:#}", e);
                let verdict = Verdict::fallback(
                    statement,
                    format!("Verification model call failed: {}", e),
                    links.to_vec(),
                    self.usage.snapshot(),
                );
                return Outcome::degraded(verdict, e.to_string());
            }
        };

        let event_input = serde_json::json!({
            "statement": statement,
            "context": "[context data omitted for brevity]",
        });

        match parse_verdict(&reply) {
            Ok(body) => {
                let verdict = Verdict {
                    statement: statement.to_string(),
                    result: body.result,
                    confidence: body.confidence,
                    explanation: body.explanation,
                    sources: body.sources.unwrap_or_else(|| links.to_vec()),
                    usage: self.usage.snapshot(),
                };
                events::log_event("Verify Statement", event_input, &verdict, false);
                Outcome::Complete(verdict)
            }
            Err(e) => {
                tracing::error!("Failed to parse verification result: {}", e);
                events::log_event(
                    "Verify Statement",
                    event_input,
                    "Failed to parse verification result",
                    false,
                );
                let verdict = Verdict::fallback(
                    statement,
                    PARSE_FAILURE_EXPLANATION,
                    links.to_vec(),
                    self.usage.snapshot(),
                );
                Outcome::degraded(verdict, e.to_string())
            }
        }
    }

    /// Check whether a vote's submitted outcome code is correct.
    ///
    /// Each call starts from an empty context, whatever the previous call's
    /// outcome was.
    pub async fn verify_vote(&mut self, contract_description: &str, message: &VoteMessage) -> VoteCheck {
        let span = tracing::info_span!(
            "verify_vote",
            run_id = %Uuid::new_v4(),
            voted = %message.p_value
        );
        self.run_vote(contract_description, message)
            .instrument(span)
            .await
    }

    /// [`verify_vote`](Self::verify_vote) bounded by `deadline`.
    pub async fn verify_vote_within(
        &mut self,
        contract_description: &str,
        message: &VoteMessage,
        deadline: Duration,
    ) -> VoteCheck {
        let result =
            tokio::time::timeout(deadline, self.verify_vote(contract_description, message)).await;
        match result {
            Ok(check) => check,
            Err(_) => {
                tracing::warn!("Vote check exceeded its {:?} deadline", deadline);
                VoteCheck::fallback(
                    message.p_value.clone(),
                    format!("Verification timed out after {}s.", deadline.as_secs_f64()),
                )
            }
        }
    }

    async fn run_vote(&mut self, contract_description: &str, message: &VoteMessage) -> VoteCheck {
        self.reset();

        if !message.sources.is_empty() {
            let plan = self
                .plan_actions(VOTE_SOURCES_QUERY, &message.sources)
                .await
                .into_value();
            self.execute_plan(&plan).await;
        }

        self.synthesize_vote(contract_description, message)
            .await
            .into_value()
    }

    /// Final synthesis call for a vote check.
    pub async fn synthesize_vote(
        &mut self,
        contract_description: &str,
        message: &VoteMessage,
    ) -> Outcome<VoteCheck> {
        let context_json = self.context.to_prompt_json();
        tracing::debug!("Context: {}", context_json);
        let prompt = synthesis::vote_prompt(contract_description, message, &context_json);

        let reply = match self
            .model
            .complete(&prompt, ChatOptions::json(), &mut self.usage)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Vote verification call failed: {:#}", e);
                let check = VoteCheck::fallback(
                    message.p_value.clone(),
                    format!("Verification model call failed: {}", e),
                );
                return Outcome::degraded(check, e.to_string());
            }
        };

        let event_input = serde_json::json!({
            "message": message,
            "contract_description": "[omitted for brevity]",
        });

        match parse_vote_check(&reply, &message.p_value) {
            Ok(check) => {
                events::log_event("Verify UMA Vote", event_input, &check, false);
                Outcome::Complete(check)
            }
            Err(e) => {
                tracing::error!("Failed to parse verification result: {}", e);
                events::log_event(
                    "Verify UMA Vote",
                    event_input,
                    "Failed to parse verification result",
                    false,
                );
                let check = VoteCheck::fallback(message.p_value.clone(), PARSE_FAILURE_EXPLANATION);
                Outcome::degraded(check, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionKind, ActionParams};
    use crate::llm::{ChatMessage, ChatResponse, TokenUsage};
    use crate::search::SearchHit;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records every prompt it is sent.
    struct StubLlm {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubLlm {
        fn new(replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn ok(replies: &[&str]) -> Arc<Self> {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> anyhow::Result<ChatResponse> {
            self.prompts.lock().unwrap().push(messages[0].content.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no reply scripted")))?;
            Ok(ChatResponse {
                content: Some(reply),
                usage: Some(TokenUsage::new(1_000, 200)),
                ..ChatResponse::default()
            })
        }
    }

    struct StubSearch(anyhow::Result<Vec<String>>);

    #[async_trait]
    impl WebSearch for StubSearch {
        async fn search(&self, _query: &str, _count: usize) -> anyhow::Result<Vec<SearchHit>> {
            match &self.0 {
                Ok(urls) => Ok(urls.iter().map(SearchHit::from_url).collect()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    struct PageAction;

    #[async_trait]
    impl Action for PageAction {
        fn kind(&self) -> ActionKind {
            ActionKind::ReadWebpageContent
        }

        async fn execute(&self, params: &ActionParams) -> anyhow::Result<Observation> {
            let url = params.require_url()?;
            Ok(Observation::success(format!("text of {}", url), url))
        }
    }

    fn agent(llm: Arc<StubLlm>, search: StubSearch) -> VerifierAgent {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(PageAction));
        VerifierAgent::new(
            llm,
            Arc::new(search),
            registry,
            DEFAULT_MODEL,
            PriceTable::default(),
        )
    }

    const PLAN_ONE_PAGE: &str = r#"{"action_plan": [
        {"action_name": "read_webpage_content", "params": {"url": "https://example.com/a"}, "reason": "news"},
        {"action_name": "read_tarot_cards", "params": {"url": "https://example.com/a"}, "reason": "why not"},
        {"action_name": "read_webpage_content", "params": {"url": "https://example.com/b"}, "reason": "second"}
    ]}"#;

    #[tokio::test]
    async fn test_statement_run_accumulates_and_skips_unknown_actions() {
        let llm = StubLlm::ok(&[
            "Is water wet?",
            PLAN_ONE_PAGE,
            r#"{"result": "Yes", "confidence": "Medium", "explanation": "Both pages agree."}"#,
        ]);
        let search = StubSearch(Ok(vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
        ]));
        let mut agent = agent(llm.clone(), search);

        let verdict = agent.verify_statement("Water is wet.").await;

        assert_eq!(verdict.result, VerdictResult::Yes);
        // `sources` omitted by the model: fall back to the search links.
        assert_eq!(
            verdict.sources,
            vec!["https://example.com/a", "https://example.com/b"]
        );
        assert_eq!(verdict.usage.prompt_tokens, 3_000);

        let pages = agent.context().get("read_webpage_content").unwrap();
        assert_eq!(pages.len(), 2);
        assert!(agent.context().get("read_tarot_cards").is_none());

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("text of https://example.com/b"));
    }

    #[tokio::test]
    async fn test_search_failure_still_yields_verdict() {
        let llm = StubLlm::ok(&["Is the moon made of cheese?", "not json at all"]);
        let mut agent = agent(llm.clone(), StubSearch(Err(anyhow::anyhow!("quota exceeded"))));

        let verdict = agent.verify_statement("The moon is made of cheese.").await;

        assert_eq!(verdict.result, VerdictResult::Unknown);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert_eq!(verdict.explanation, PARSE_FAILURE_EXPLANATION);
        assert!(verdict.sources.is_empty());
        assert!(agent.context().is_empty());
        // No links, so no planning call: question + synthesis only.
        assert_eq!(llm.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_model_outage_degrades_every_stage() {
        let llm = StubLlm::new(vec![]);
        let mut agent = agent(
            llm,
            StubSearch(Ok(vec!["https://example.com/a".to_string()])),
        );

        let verdict = agent.verify_statement("Rust 1.0 shipped in 2015.").await;

        assert_eq!(verdict.result, VerdictResult::Unknown);
        assert!(verdict.explanation.starts_with("Verification model call failed"));
        assert_eq!(verdict.sources, vec!["https://example.com/a"]);
        assert!(verdict.usage.cost_usd >= 0.0);
    }

    #[tokio::test]
    async fn test_runs_do_not_share_context_or_usage() {
        let llm = StubLlm::ok(&[
            "Q1?",
            PLAN_ONE_PAGE,
            r#"{"result": "No", "confidence": "High"}"#,
            "Q2?",
            r#"{"action_plan": []}"#,
            r#"{"result": "Unknown"}"#,
        ]);
        let mut agent = agent(
            llm,
            StubSearch(Ok(vec!["https://example.com/a".to_string()])),
        );

        let first = agent.verify_statement("First.").await;
        assert_eq!(agent.context().observation_count(), 2);

        let second = agent.verify_statement("Second.").await;
        assert!(agent.context().is_empty());
        assert_eq!(first.usage.prompt_tokens, 3_000);
        assert_eq!(second.usage.prompt_tokens, 3_000);
    }

    fn vote(sources: &[&str]) -> VoteMessage {
        VoteMessage {
            user: Some("alice".to_string()),
            p_value: "P1".to_string(),
            evidence: Some("Official box score".to_string()),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            ..VoteMessage::default()
        }
    }

    #[tokio::test]
    async fn test_vote_uses_message_sources() {
        let llm = StubLlm::ok(&[
            r#"{"action_plan": [{"action_name": "read_webpage_content", "params": {"url": "https://scores.example/game"}, "reason": "evidence"}]}"#,
            r#"{"voted_P": "P1", "is_correct": true, "confidence": "High", "explanation": "Box score confirms."}"#,
        ]);
        let mut agent = agent(llm.clone(), StubSearch(Ok(vec![])));

        let check = agent
            .verify_vote("P1: home team wins. P2: away team wins.", &vote(&["https://scores.example/game"]))
            .await;

        assert!(check.is_correct);
        assert_eq!(check.confidence, Confidence::High);
        let prompts = llm.prompts();
        assert!(prompts[0].contains(VOTE_SOURCES_QUERY));
        assert!(prompts[1].contains("P value submitted: P1"));
        assert!(prompts[1].contains("text of https://scores.example/game"));
    }

    #[tokio::test]
    async fn test_vote_parse_failure_and_scoping() {
        let llm = StubLlm::ok(&[
            r#"{"action_plan": [{"action_name": "read_webpage_content", "params": {"url": "https://a.example"}}]}"#,
            r#"{"voted_P": "P1", "is_correct": false, "confidence": "Medium", "explanation": "Away team won."}"#,
            "P1 looks right to me",
        ]);
        let mut agent = agent(llm.clone(), StubSearch(Ok(vec![])));

        let first = agent.verify_vote("contract", &vote(&["https://a.example"])).await;
        assert!(!first.is_correct);
        assert_eq!(agent.context().observation_count(), 1);

        // Second message has no sources: it must not see the first one's evidence.
        let second = agent.verify_vote("contract", &vote(&[])).await;
        assert_eq!(second, VoteCheck::fallback("P1", PARSE_FAILURE_EXPLANATION));
        assert!(agent.context().is_empty());
        assert!(!llm.prompts()[2].contains("https://a.example"));
    }

    #[tokio::test]
    async fn test_vote_model_outage_keeps_submitted_value() {
        let llm = StubLlm::new(vec![]);
        let mut agent = agent(llm, StubSearch(Ok(vec![])));

        let check = agent.verify_vote("contract", &vote(&[])).await;

        assert_eq!(check.voted_value, "P1");
        assert!(!check.is_correct);
        assert_eq!(check.confidence, Confidence::Low);
        assert!(check.explanation.starts_with("Verification model call failed"));
    }
}
