//! Model-assisted summary of a multi-turn conversation.

use std::sync::Arc;

use tracing::{info, warn};

use super::ConversationTurn;
use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts::context_synthesis_prompt;

const SYNTHESIS_TEMPERATURE: f64 = 0.3;
const SYNTHESIS_MAX_TOKENS: u32 = 200;

/// Condenses conversation history into cumulative preferences.
#[derive(Clone)]
pub struct ContextSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl ContextSynthesizer {
    /// Create a synthesizer over the given service
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Whether a history of `turns` exchanges is worth synthesizing
    pub fn should_synthesize(turns: usize) -> bool {
        turns >= 3
    }

    /// Summarize the history; empty when too short or on failure
    pub async fn synthesize(&self, history: &[ConversationTurn]) -> String {
        if history.len() < 2 {
            return String::new();
        }

        let history_text = history
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}", turn.query_text, turn.response_text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = GenerationRequest::new(context_synthesis_prompt(&history_text))
            .with_temperature(SYNTHESIS_TEMPERATURE)
            .with_max_tokens(SYNTHESIS_MAX_TOKENS);

        match self.generator.generate(request).await {
            Ok(generation) => {
                let synthesis = generation.text.trim().to_string();
                info!(synthesis_length = synthesis.len(), "Context synthesized");
                synthesis
            }
            Err(e) => {
                warn!(error = %e, "Context synthesis failed");
                String::new()
            }
        }
    }
}
