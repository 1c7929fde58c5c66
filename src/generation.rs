//! The schematic generator: a single contract for producing typed JSON
//! objects from a prompt via an LLM (spec §2, §9 "Schematic generator as an
//! abstraction").
//!
//! Grounded in the original `core/generation/schematic.py` /
//! `llm/schematic_generators.py`: a generator is asked for JSON, tries a
//! strict parse first, then a "json-finder" fallback that scans the raw text
//! for the first balanced `{...}` object, and only then reports
//! [`GenerationError::UnparseableOutput`]. [`FallbackGenerator`] chains
//! several backends and surfaces the last error, matching
//! `TogetherAISchematicGenerator`/`OpenAISchematicGenerator` being
//! interchangeable behind the same `SchematicGenerator[T]` in the original.

use crate::error::GenerationError;
use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Hints passed through to the backend, filtered to whatever it supports
/// (mirrors `OpenAISchematicGenerator.supported_arguments` /
/// `TogetherAISchematicGenerator.supported_arguments`).
#[derive(Debug, Clone, Default)]
pub struct GenerationHints {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationHints {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A typed generation result, mirroring `SchematicGenerationResult[T]`.
#[derive(Debug, Clone)]
pub struct SchematicGenerationResult<T> {
    pub content: T,
}

/// Strict-parse-then-json-finder extraction, shared by every backend so the
/// fallback behavior is identical regardless of which LLM produced the text
/// (spec §7 `generation_error`).
pub fn extract_json(raw: &str) -> Result<Value, GenerationError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(_) => find_json_object(raw)
            .ok_or_else(|| GenerationError::UnparseableOutput(raw.to_string())),
    }
}

/// Scans `text` for the first balanced `{...}` substring and parses it,
/// the Rust equivalent of the original's `jsonfinder.only_json`.
fn find_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }

    None
}

/// A backend capable of producing a typed JSON object from a prompt.
/// Implemented by [`OpenAiGenerator`], [`AnthropicGenerator`], and
/// [`FallbackGenerator`].
#[async_trait]
pub trait SchematicGenerator: Send + Sync {
    /// Produce a raw JSON value for `prompt`. Callers typically go through
    /// [`SchematicGeneratorExt::generate`] instead, which also validates the
    /// shape against a target type.
    async fn generate_value(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<Value, GenerationError>;

    /// A short name for logging (e.g. `"gpt-4o"`, `"claude-3-5-sonnet"`).
    fn name(&self) -> &str;
}

/// Blanket extension deserializing a generator's raw JSON into `T`.
#[async_trait]
pub trait SchematicGeneratorExt {
    async fn generate<T: DeserializeOwned + Send>(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<T>, GenerationError>;
}

#[async_trait]
impl<G: SchematicGenerator + ?Sized> SchematicGeneratorExt for G {
    async fn generate<T: DeserializeOwned + Send>(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<T>, GenerationError> {
        let value = self.generate_value(prompt, hints).await?;
        let content = serde_json::from_value(value.clone())
            .map_err(|e| GenerationError::SchemaMismatch(format!("{e}: {value}")))?;
        Ok(SchematicGenerationResult { content })
    }
}

/// An OpenAI-backed generator (`gpt-4o`, `gpt-4o-mini`, ...), grounded in
/// `OpenAISchematicGenerator`/the teacher's `OpenAIProvider`.
pub struct OpenAiGenerator {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        }
    }

    pub fn gpt_4o(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "gpt-4o")
    }

    pub fn gpt_4o_mini(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "gpt-4o-mini")
    }
}

#[async_trait]
impl SchematicGenerator for OpenAiGenerator {
    async fn generate_value(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<Value, GenerationError> {
        trace!(model = %self.model, "sending schematic generation request to OpenAI");

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(vec![ChatCompletionRequestUserMessage::from(prompt).into()])
            .response_format(async_openai::types::ResponseFormat::JsonObject);

        if let Some(temperature) = hints.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_tokens) = hints.max_tokens {
            builder.max_tokens(max_tokens);
        }

        let request = builder
            .build()
            .map_err(|e| GenerationError::Backend(Box::new(e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| GenerationError::Backend(Box::new(e)))?;

        let raw = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        debug!(model = %self.model, response_len = raw.len(), "received schematic generation response");

        extract_json(&raw)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// An Anthropic-backed generator, grounded in `AnthropicProvider`/the
/// `anthropic-sdk` crate usage in the teacher's provider module. Anthropic
/// has no native JSON-mode flag, so the prompt must itself instruct the
/// model to answer with a single JSON object; the strict-parse-then-finder
/// fallback in [`extract_json`] is what actually tolerates any leading or
/// trailing prose the model adds anyway.
pub struct AnthropicGenerator {
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
        }
    }

    pub fn claude_3_5_sonnet(api_key: impl Into<String>) -> Self {
        Self::new(api_key, "claude-3-5-sonnet-20241022")
    }
}

#[async_trait]
impl SchematicGenerator for AnthropicGenerator {
    async fn generate_value(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<Value, GenerationError> {
        use std::sync::Mutex as StdMutex;

        trace!(model = %self.model, "sending schematic generation request to Anthropic");

        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);

        let mut builder = anthropic_sdk::Client::new()
            .auth(&self.api_key)
            .model(&self.model)
            .messages(&messages)
            .max_tokens(hints.max_tokens.unwrap_or(self.max_tokens) as i32);

        if let Some(temperature) = hints.temperature {
            builder = builder.temperature(temperature);
        }

        let request = builder
            .build()
            .map_err(|e| GenerationError::Backend(format!("failed to build request: {e}").into()))?;

        let collected = Arc::new(StdMutex::new(String::new()));
        let collected_clone = Arc::clone(&collected);

        request
            .execute(move |chunk| {
                let collected = Arc::clone(&collected_clone);
                async move {
                    collected.lock().expect("anthropic buffer lock poisoned").push_str(&chunk);
                }
            })
            .await
            .map_err(|e| GenerationError::Backend(format!("Anthropic API error: {e}").into()))?;

        let raw = collected.lock().expect("anthropic buffer lock poisoned").clone();
        debug!(model = %self.model, response_len = raw.len(), "received schematic generation response");

        extract_json(&raw)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Tries each backend in order, returning the first success; surfaces the
/// last backend's error if every one fails (spec §9, `GenerationError::FallbackExhausted`).
pub struct FallbackGenerator {
    backends: Vec<Arc<dyn SchematicGenerator>>,
}

impl FallbackGenerator {
    pub fn new(backends: Vec<Arc<dyn SchematicGenerator>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl SchematicGenerator for FallbackGenerator {
    async fn generate_value(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<Value, GenerationError> {
        let mut last_error: Option<GenerationError> = None;

        for backend in &self.backends {
            match backend.generate_value(prompt, hints).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(backend = backend.name(), error = %err, "schematic generator backend failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        Err(GenerationError::FallbackExhausted(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no backends configured".to_string()),
        ))
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Decision {
        applies: bool,
        score: u8,
    }

    #[test]
    fn test_extract_json_strict_parse() {
        let raw = r#"{"applies": true, "score": 8}"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["score"], 8);
    }

    #[test]
    fn test_extract_json_finder_fallback_with_surrounding_prose() {
        let raw = "Sure, here's the object:\n{\"applies\": true, \"score\": 9}\nHope that helps!";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["score"], 9);
    }

    #[test]
    fn test_extract_json_finder_handles_nested_braces() {
        let raw = "prefix {\"outer\": {\"inner\": 1}, \"score\": 7} suffix";
        let value = extract_json(raw).unwrap();
        assert_eq!(value["outer"]["inner"], 1);
        assert_eq!(value["score"], 7);
    }

    #[test]
    fn test_extract_json_unparseable_fails() {
        let raw = "this is not json at all";
        assert!(extract_json(raw).is_err());
    }

    struct StubGenerator {
        name: &'static str,
        response: Result<Value, GenerationError>,
    }

    #[async_trait]
    impl SchematicGenerator for StubGenerator {
        async fn generate_value(
            &self,
            _prompt: &str,
            _hints: &GenerationHints,
        ) -> Result<Value, GenerationError> {
            self.response.as_ref().cloned().map_err(|e| GenerationError::UnparseableOutput(e.to_string()))
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn test_generate_deserializes_into_target_type() {
        let stub = StubGenerator {
            name: "stub",
            response: Ok(serde_json::json!({"applies": true, "score": 8})),
        };

        let result: SchematicGenerationResult<Decision> =
            stub.generate("irrelevant prompt", &GenerationHints::default()).await.unwrap();

        assert_eq!(result.content, Decision { applies: true, score: 8 });
    }

    #[tokio::test]
    async fn test_generate_schema_mismatch_errors() {
        let stub = StubGenerator {
            name: "stub",
            response: Ok(serde_json::json!({"unexpected": "shape"})),
        };

        let result = stub
            .generate::<Decision>("irrelevant prompt", &GenerationHints::default())
            .await;

        assert!(matches!(result, Err(GenerationError::SchemaMismatch(_))));
    }

    #[tokio::test]
    async fn test_fallback_tries_next_backend_on_failure() {
        let failing = Arc::new(StubGenerator {
            name: "failing",
            response: Err(GenerationError::UnparseableOutput("boom".into())),
        });
        let succeeding = Arc::new(StubGenerator {
            name: "succeeding",
            response: Ok(serde_json::json!({"applies": false, "score": 2})),
        });

        let fallback = FallbackGenerator::new(vec![failing, succeeding]);
        let result: SchematicGenerationResult<Decision> = fallback
            .generate("irrelevant prompt", &GenerationHints::default())
            .await
            .unwrap();

        assert_eq!(result.content, Decision { applies: false, score: 2 });
    }

    #[tokio::test]
    async fn test_fallback_exhausted_when_every_backend_fails() {
        let a = Arc::new(StubGenerator {
            name: "a",
            response: Err(GenerationError::UnparseableOutput("a failed".into())),
        });
        let b = Arc::new(StubGenerator {
            name: "b",
            response: Err(GenerationError::UnparseableOutput("b failed".into())),
        });

        let fallback = FallbackGenerator::new(vec![a, b]);
        let result = fallback.generate_value("x", &GenerationHints::default()).await;

        assert!(matches!(result, Err(GenerationError::FallbackExhausted(_))));
    }
}
