//! OpenAI-compatible LLM provider
//!
//! Serves OpenAI itself and the upstreams that clone its chat-completions
//! protocol (Grok, DeepSeek, Perplexity).

use super::{
    default_max_tokens, error_message, registry::http_client, spawn_stream, ChatMessage,
    ChatOptions, Finish, FrameDecoder, LlmError, LlmProvider, LlmStream, ProviderConfig,
    ProviderKind,
};
use tokio_util::sync::CancellationToken;

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    kind: ProviderKind,

    /// API key
    api_key: String,

    /// Base URL, e.g. `https://api.openai.com/v1`
    base_url: String,

    model: String,

    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            kind: config.kind,
            api_key: config.api_key.clone(),
            base_url: config.base_url(),
            model: config.model(),
            client: http_client(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage], options: &ChatOptions) -> serde_json::Value {
        let conversation: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role_str(),
                    "content": msg.content
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": conversation,
            "stream": true,
        });

        if let Some(max_tokens) = options
            .max_tokens
            .or_else(|| default_max_tokens(self.kind, &self.model))
        {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = temperature.into();
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = top_p.into();
        }
        if let Some(penalty) = options.frequency_penalty {
            body["frequency_penalty"] = penalty.into();
        }
        if let Some(penalty) = options.presence_penalty {
            body["presence_penalty"] = penalty.into();
        }

        body
    }
}

impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        self.kind.as_str()
    }

    fn name(&self) -> &str {
        self.kind.display_name()
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
            "{} chat: model={} messages={}",
            self.name(),
            self.model,
            messages.len()
        );

        let body = self.request_body(&messages, options);
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        spawn_stream(request, OpenAiDecoder, cancel)
    }
}

/// Decodes `{choices:[{delta:{content}}]}` events
pub(crate) struct OpenAiDecoder;

impl FrameDecoder for OpenAiDecoder {
    fn decode(&mut self, _event: &str, data: &str, out: &mut Vec<String>) -> Option<Finish> {
        if data == "[DONE]" {
            return Some(Finish::Done);
        }

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

        let choice = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())?;

        if let Some(content) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
        {
            if !content.is_empty() {
                out.push(content.to_string());
            }
        }

        match choice.get("finish_reason").and_then(|f| f.as_str()) {
            Some("stop") => Some(Finish::Done),
            _ => None,
        }
    }
}
