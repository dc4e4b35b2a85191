//! Model calls with usage accounting.

use std::sync::Arc;
use std::time::Instant;

use crate::budget::UsageTracker;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};

/// A completion client bound to one model id.
#[derive(Clone)]
pub struct TrackedModel {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl TrackedModel {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Send `prompt` as a single user turn and return the reply text.
    ///
    /// Time is charged to `usage` whether or not the call succeeds.
    pub async fn complete(
        &self,
        prompt: &str,
        options: ChatOptions,
        usage: &mut UsageTracker,
    ) -> anyhow::Result<String> {
        let start = Instant::now();
        let result = self
            .llm
            .chat_completion(&self.model, &[ChatMessage::user(prompt)], options)
            .await;

        match result {
            Ok(response) => {
                usage.record(&response, start.elapsed());
                Ok(response.text().to_string())
            }
            Err(e) => {
                usage.add_elapsed(start.elapsed());
                Err(e)
            }
        }
    }
}
