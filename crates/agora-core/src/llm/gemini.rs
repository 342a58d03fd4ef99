//! Gemini LLM provider
//!
//! Uses `streamGenerateContent` with `alt=sse`. The system prompt travels in
//! `systemInstruction` and assistant turns are sent with role `model`.

use super::{
    default_max_tokens, error_message, registry::http_client, spawn_stream, split_system,
    ChatMessage, ChatOptions, Finish, FrameDecoder, LlmError, LlmProvider, LlmStream,
    ProviderConfig, ProviderKind, Role,
};
use tokio_util::sync::CancellationToken;

/// Gemini provider
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url(),
            model: config.model(),
            client: http_client(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage], options: &ChatOptions) -> serde_json::Value {
        let (system, turns) = split_system(messages);

        let mut contents: Vec<serde_json::Value> = turns
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": msg.content }]
                })
            })
            .collect();

        if contents.is_empty() {
            contents.push(serde_json::json!({
                "role": "user",
                "parts": [{ "text": "Hello" }]
            }));
        }

        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = options
            .max_tokens
            .or_else(|| default_max_tokens(ProviderKind::Gemini, &self.model))
        {
            generation.insert("maxOutputTokens".into(), max_tokens.into());
        }
        if let Some(temperature) = options.temperature {
            generation.insert("temperature".into(), temperature.into());
        }
        if let Some(top_p) = options.top_p {
            generation.insert("topP".into(), top_p.into());
        }
        if let Some(top_k) = options.top_k {
            generation.insert("topK".into(), top_k.into());
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation,
        });

        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }

        body
    }
}

impl LlmProvider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> LlmStream {
        tracing::debug!(
            "Gemini chat: model={} messages={}",
            self.model,
            messages.len()
        );

        let body = self.request_body(&messages, options);
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.base_url, self.model
        );
        let request = self
            .client
            .post(url)
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&body);

        spawn_stream(request, GeminiDecoder, cancel)
    }
}

/// Decodes `{candidates:[{content:{parts:[{text}]}, finishReason}]}` events
pub(crate) struct GeminiDecoder;

impl FrameDecoder for GeminiDecoder {
    fn decode(&mut self, _event: &str, data: &str, out: &mut Vec<String>) -> Option<Finish> {
        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(json) => json,
            Err(e) => {
                tracing::trace!("Skipping malformed frame: {}", e);
                return None;
            }
        };

        if let Some(message) = error_message(&json) {
            return Some(Finish::Error(LlmError::Stream(message)));
        }

        let candidate = json
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())?;

        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                // Thought summaries are reasoning, not answer text
                if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
                    continue;
                }
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        out.push(text.to_string());
                    }
                }
            }
        }

        match candidate.get("finishReason").and_then(|f| f.as_str()) {
            Some("STOP") => Some(Finish::Done),
            _ => None,
        }
    }
}
