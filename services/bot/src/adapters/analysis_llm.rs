//! services/bot/src/adapters/analysis_llm.rs
//!
//! This module contains the adapter for the document-analysis LLM.
//! It implements the `TextAnalysisService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use shelfbot_core::domain::DocumentAnalysis;
use shelfbot_core::ports::{PortError, PortResult, TextAnalysisService};
use std::time::Duration;
use tracing::warn;

const SYSTEM_INSTRUCTIONS: &str = "You are a librarian assistant. You receive text extracted \
from the beginning of an uploaded document and must infer catalog metadata. Respond with a \
single raw JSON object (no markdown fences) with the keys: \"category\" (one of \"Book\", \
\"Personal Notes\", \"PYQs/Exams\", \"Other\"), \"subject\" (the academic subject), \"title\" \
(a clean descriptive title), \"year\" (publication or exam year as a number, or null), \
\"edition\" (string or null), \"semester\" (string or null), and \"summary\" (one brief \
sentence, or null).";

const MAX_ATTEMPTS: usize = 3;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextAnalysisService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiAnalysisAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAnalysisAdapter {
    /// Creates a new `OpenAiAnalysisAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// The degraded value returned when every attempt fails. Uploads must
    /// never fail because analysis did.
    fn fallback(file_name: &str) -> DocumentAnalysis {
        DocumentAnalysis {
            category: "Other".to_string(),
            subject: "Uncategorized".to_string(),
            title: file_name.to_string(),
            year: None,
            edition: None,
            semester: None,
            summary: Some("Could not analyze.".to_string()),
        }
    }
}

/// The JSON shape the model is instructed to return.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    edition: Option<String>,
    #[serde(default)]
    semester: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl AnalysisPayload {
    fn to_domain(self, file_name: &str) -> DocumentAnalysis {
        DocumentAnalysis {
            category: self.category.unwrap_or_else(|| "Other".to_string()),
            subject: self.subject.unwrap_or_else(|| "Uncategorized".to_string()),
            title: self.title.unwrap_or_else(|| file_name.to_string()),
            year: self.year,
            edition: self.edition,
            semester: self.semester,
            summary: self.summary,
        }
    }
}

fn is_rate_limited(error: &OpenAIError) -> bool {
    match error {
        OpenAIError::ApiError(api) => {
            api.code.as_deref() == Some("rate_limit_exceeded")
                || api
                    .r#type
                    .as_deref()
                    .is_some_and(|t| t.contains("rate_limit"))
        }
        _ => false,
    }
}

/// Models wrap JSON in ```json fences despite instructions; strip them.
fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

//=========================================================================================
// `TextAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextAnalysisService for OpenAiAnalysisAdapter {
    /// Infers catalog metadata from extracted document text. Rate-limit
    /// failures are retried with exponential backoff; any exhausted or
    /// unparseable result degrades to a fallback value instead of an error.
    async fn analyze_document_text(
        &self,
        text: &str,
        file_name: &str,
    ) -> PortResult<DocumentAnalysis> {
        let snippet: String = text.chars().take(5000).collect();
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "Original filename: \"{}\"\n\nText snippet:\n{}",
                    file_name, snippet
                ))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        for attempt in 0..MAX_ATTEMPTS {
            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.message.content);
                    let Some(content) = content else {
                        warn!("Analysis LLM returned no content; using fallback");
                        return Ok(Self::fallback(file_name));
                    };
                    return match serde_json::from_str::<AnalysisPayload>(strip_fences(&content)) {
                        Ok(payload) => Ok(payload.to_domain(file_name)),
                        Err(e) => {
                            warn!(error = %e, "Analysis LLM returned unparseable JSON; using fallback");
                            Ok(Self::fallback(file_name))
                        }
                    };
                }
                Err(e) if is_rate_limited(&e) && attempt + 1 < MAX_ATTEMPTS => {
                    let wait = Duration::from_secs(1u64 << (attempt + 1));
                    warn!(
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs(),
                        "Analysis LLM rate limited; backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    warn!(error = %e, "Analysis LLM call failed; using fallback");
                    return Ok(Self::fallback(file_name));
                }
            }
        }

        Ok(Self::fallback(file_name))
    }
}
