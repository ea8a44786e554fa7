// response_agent.rs
use crate::agent::{report_failure, send, Agent};
use crate::bus::MessageBus;
use crate::document::{LlmResponse, RetrievalResult};
use crate::error::RagError;
use crate::message::{names, ContextResponse, FinalResponse, Message, MessageBody};
use crate::prompt::Prompt;
use crate::provider::GenerationProvider;
use async_trait::async_trait;
use cli_log::info;
use std::sync::Arc;

/// Turns ranked context into a cited answer.
pub struct ResponseAgent {
    generator: Arc<dyn GenerationProvider>,
}

impl ResponseAgent {
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    async fn answer(&self, context: &ContextResponse) -> Result<LlmResponse, RagError> {
        let result = &context.result;
        let prompt = Prompt::build_prompt(
            &Prompt::build_context(&result.chunks),
            &context.original_query,
        );
        let answer = self
            .generator
            .generate(Prompt::SYSTEM_INSTRUCTION, &prompt)
            .await?;

        let sources = unique_sources(result);
        Ok(LlmResponse {
            answer,
            reasoning: format!(
                "Based on {} relevant chunks from {} documents",
                result.chunks.len(),
                sources.len()
            ),
            sources,
            confidence: confidence(&result.scores),
        })
    }
}

/// Source names of the ranked chunks, first occurrence order.
fn unique_sources(result: &RetrievalResult) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in &result.chunks {
        if !sources.contains(&chunk.metadata.source) {
            sources.push(chunk.metadata.source.clone());
        }
    }
    sources
}

/// Mean score scaled to 0..=100; 0 when there are no scores.
fn confidence(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f32>() / scores.len() as f32;
    (mean * 100.0).clamp(0.0, 100.0)
}

#[async_trait]
impl Agent for ResponseAgent {
    fn name(&self) -> &'static str {
        names::RESPONSE
    }

    fn accepts(&self, body: &MessageBody) -> bool {
        matches!(body, MessageBody::ContextResponse(_))
    }

    async fn handle(&self, message: Message, bus: Arc<MessageBus>) {
        let MessageBody::ContextResponse(context) = &message.body else {
            return;
        };
        info!(
            "[{}] Generating answer from {} chunks",
            self.name(),
            context.result.chunks.len()
        );
        match self.answer(context).await {
            Ok(response) => {
                let body = MessageBody::FinalResponse(FinalResponse {
                    response,
                    original_query: context.original_query.clone(),
                });
                send(&bus, self.name(), names::COORDINATOR, &message.trace_id, body);
            }
            Err(error) => report_failure(
                &bus,
                self.name(),
                &message.trace_id,
                MessageBody::LlmResponseError,
                error,
                &context.original_query,
            ),
        }
    }
}
