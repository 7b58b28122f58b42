use async_trait::async_trait;
use rig::{
    client::CompletionClient,
    completion::Prompt,
    providers::{openai, openrouter},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{LlmProvider, ServiceConfig};
use crate::error::LlmError;
use crate::models::{Extraction, RECOGNIZED_KEYS, StructuredResult};

pub type StructuredOutcome = Extraction<StructuredResult, LlmError>;

pub const SYSTEM_PROMPT: &str = r#"You are an expert medical coder and insurance specialist. Extract the following information from the provided text extracted from an insurance card and a clinical document.
Return ONLY a valid JSON object with these keys:
- "patient_name"
- "date_of_birth" (format: YYYY-MM-DD)
- "insurance_company"
- "policy_number"
- "group_number"
- "proposed_cpt_codes" (as an array of strings, e.g., ["99213", "93000"])
- "proposed_icd_codes" (as an array of strings, e.g., ["I10", "E11.9"])
- "estimated_denial_risk" (a number between 0 and 1, based on inconsistencies or missing data)

If any information is missing or cannot be found, set the value to null.
"#;

/// A chat completion backend: one system turn, one user turn, text reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Chat model backed by a rig provider client. The client is built once and
/// a short-lived agent is created per call.
pub struct RigChatModel<C> {
    client: C,
    model: String,
    temperature: f64,
}

impl<C> RigChatModel<C> {
    pub fn new(client: C, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl<C> ChatModel for RigChatModel<C>
where
    C: CompletionClient + Send + Sync + 'static,
{
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(system)
            .temperature(self.temperature)
            .build();

        agent
            .prompt(user)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))
    }
}

pub fn build_chat_model(config: &ServiceConfig) -> Arc<dyn ChatModel> {
    match config.llm_provider {
        LlmProvider::Openai => Arc::new(RigChatModel::new(
            openai::Client::new(&config.api_key),
            config.llm_model.clone(),
            config.llm_temperature,
        )),
        LlmProvider::Openrouter => Arc::new(RigChatModel::new(
            openrouter::Client::new(&config.api_key),
            config.llm_model.clone(),
            config.llm_temperature,
        )),
    }
}

/// Ask the model for the structured claim record.
pub async fn extract_structured_data(chat: &dyn ChatModel, text: &str) -> StructuredOutcome {
    let reply = match chat.complete(SYSTEM_PROMPT, text).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "LLM Error");
            return Extraction::Failed(e);
        }
    };

    match parse_structured_reply(&reply) {
        Ok(data) if data.is_empty() => {
            info!("LLM returned an empty object");
            Extraction::Empty
        }
        Ok(data) => {
            log_result_shape(&data);
            Extraction::Found(data)
        }
        Err(e) => {
            warn!(error = %e, reply_chars = reply.len(), "LLM Error");
            Extraction::Failed(e)
        }
    }
}

/// The reply must be exactly one JSON object. Markdown fences or trailing
/// prose are treated as a failure.
pub fn parse_structured_reply(reply: &str) -> Result<StructuredResult, LlmError> {
    match serde_json::from_str::<Value>(reply)? {
        Value::Object(map) => Ok(map),
        _ => Err(LlmError::NotAnObject),
    }
}

fn log_result_shape(data: &StructuredResult) {
    let keys_present = RECOGNIZED_KEYS
        .iter()
        .filter(|key| data.contains_key(**key))
        .count();
    info!(
        keys_present,
        keys_total = data.len(),
        "Structured data extracted"
    );

    if let Some(risk) = data.get("estimated_denial_risk").and_then(Value::as_f64) {
        if !(0.0..=1.0).contains(&risk) {
            warn!(risk, "estimated_denial_risk outside [0, 1], passing through");
        }
    }
}
