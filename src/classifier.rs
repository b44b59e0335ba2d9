//! AI-based report classification
//!
//! Judges whether a free-text description is actually a pothole report
//! before any session fields are stored. The adapter is deliberately
//! fail-open: a classifier outage or malformed reply must never block a
//! legitimate report, at the cost of some false accepts.

use crate::config::{
    CLASSIFIER_MAX_TOKENS, CLASSIFIER_MODEL, CLASSIFIER_TEMPERATURE, CLASSIFIER_TIMEOUT_SECS,
};
use async_openai::types::chat::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Instruction describing the accept criteria and the strict output contract
const CLASSIFIER_PROMPT: &str = r#"Eres un clasificador de reportes ciudadanos. Tu tarea es determinar si una descripción corresponde a un reporte de BACHE en la calle/carretera.

Un BACHE válido incluye:
- Huecos o hundimientos en calles, avenidas o carreteras
- Deterioro del pavimento o asfalto
- Problemas en la superficie de rodadura
- Daños en el pavimento que afectan el tránsito

NO son baches:
- Basura o acumulación de residuos
- Problemas de alumbrado público
- Animales callejeros
- Problemas de alcantarillado o drenaje (a menos que hayan causado un bache)
- Árboles caídos
- Problemas de señalización
- Otros problemas urbanos no relacionados con el pavimento

Responde ÚNICAMENTE con un objeto JSON en este formato:
{"isValid": true} si es un reporte de bache
{"isValid": false, "reason": "breve razón"} si NO es un reporte de bache

Ejemplos:
"Hay un bache grande en la Av. América" -> {"isValid": true}
"Basura acumulada en la esquina" -> {"isValid": false, "reason": "Es un reporte de basura, no de bache"}
"La calle está hundida por una fuga de agua" -> {"isValid": true}
"Hay un perro muerto en la calle" -> {"isValid": false, "reason": "No es un problema de pavimento"}"#;

/// Verdict returned by the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Whether the description was accepted as a pothole report
    pub accepted: bool,
    /// Short rejection reason, when the classifier provided one
    pub reason: Option<String>,
}

impl Classification {
    /// Permissive verdict used whenever the classifier cannot answer
    #[must_use]
    pub const fn fail_open() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }
}

/// Capability of judging whether free text matches the report category
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportClassifier: Send + Sync {
    /// Classify a report description. Infallible by contract: call or
    /// parse failures resolve to the fail-open verdict.
    async fn classify(&self, description: &str) -> Classification;
}

/// Expected shape of the model's JSON reply
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(rename = "isValid")]
    is_valid: bool,
    reason: Option<String>,
}

/// OpenAI-backed classifier implementation
pub struct OpenAiClassifier {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiClassifier {
    /// Create a classifier using the given API key
    #[must_use]
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            timeout: Duration::from_secs(CLASSIFIER_TIMEOUT_SECS),
        }
    }

    async fn request_verdict(&self, description: &str) -> anyhow::Result<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(CLASSIFIER_PROMPT)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(description)
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(CLASSIFIER_MODEL)
            .messages(messages)
            .temperature(CLASSIFIER_TEMPERATURE)
            .max_tokens(CLASSIFIER_MAX_TOKENS)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| anyhow::anyhow!("classifier call timed out"))??;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("empty classifier response"))
    }
}

#[async_trait]
impl ReportClassifier for OpenAiClassifier {
    async fn classify(&self, description: &str) -> Classification {
        let raw = match self.request_verdict(description).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("🤖 Classifier call failed, accepting report (fail-open): {e}");
                return Classification::fail_open();
            }
        };

        parse_verdict(&raw)
    }
}

/// Parse the model's reply, falling back to acceptance when it does not
/// honor the JSON contract.
fn parse_verdict(raw: &str) -> Classification {
    match serde_json::from_str::<RawVerdict>(raw.trim()) {
        Ok(verdict) => {
            debug!(
                "🤖 Classifier verdict: accepted={} reason={:?}",
                verdict.is_valid, verdict.reason
            );
            Classification {
                accepted: verdict.is_valid,
                reason: verdict.reason,
            }
        }
        Err(e) => {
            warn!("🤖 Unparseable classifier reply ({e}), accepting report (fail-open): {raw}");
            Classification::fail_open()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accept() {
        let verdict = parse_verdict(r#"{"isValid": true}"#);
        assert!(verdict.accepted);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_parse_reject_with_reason() {
        let verdict = parse_verdict(r#"{"isValid": false, "reason": "Es basura, no un bache"}"#);
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason.as_deref(), Some("Es basura, no un bache"));
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let verdict = parse_verdict("\n  {\"isValid\": false, \"reason\": \"x\"}  \n");
        assert!(!verdict.accepted);
    }

    #[test]
    fn test_malformed_reply_fails_open() {
        for raw in ["not json", "", "{\"isValid\": \"maybe\"}", "```json\n{}\n```"] {
            let verdict = parse_verdict(raw);
            assert!(verdict.accepted, "fail-open expected for {raw:?}");
            assert!(verdict.reason.is_none());
        }
    }
}
