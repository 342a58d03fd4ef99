//! Anthropic LLM provider
//!
//! Streams from the Messages API. Extended-reasoning models interleave
//! `thinking` content blocks with text blocks; only text blocks are surfaced.

use super::{
    default_max_tokens, error_message, registry::http_client, spawn_stream, split_system,
    ChatMessage, ChatOptions, Finish, FrameDecoder, LlmError, LlmProvider, LlmStream,
    ProviderConfig, ProviderKind, Role,
};
use tokio_util::sync::CancellationToken;

pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
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

        let mut conversation: Vec<serde_json::Value> = turns
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                };
                serde_json::json!({ "role": role, "content": msg.content })
            })
            .collect();

        // The API rejects an empty message list
        if conversation.is_empty() {
            conversation.push(serde_json::json!({ "role": "user", "content": "Hello" }));
        }

        let max_tokens = options
            .max_tokens
            .or_else(|| default_max_tokens(ProviderKind::Anthropic, &self.model))
            .unwrap_or(4096);

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "stream": true,
            "messages": conversation
        });

        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = temperature.into();
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = top_p.into();
        }
        if let Some(top_k) = options.top_k {
            body["top_k"] = top_k.into();
        }

        body
    }
}

impl LlmProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn name(&self) -> &str {
        "Anthropic"
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
            "Anthropic chat: model={} messages={}",
            self.model,
            messages.len()
        );

        let body = self.request_body(&messages, options);
        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        spawn_stream(request, AnthropicDecoder::default(), cancel)
    }
}

/// Tracks content-block boundaries so thinking blocks stay hidden.
///
/// `suppress` changes only on `content_block_start` / `content_block_stop`.
/// The frame type comes from the payload's `type`, falling back to the SSE
/// event name.
#[derive(Debug, Default)]
pub(crate) struct AnthropicDecoder {
    open_block: Option<u64>,
    suppress: bool,
}

impl FrameDecoder for AnthropicDecoder {
    fn decode(&mut self, event: &str, data: &str, out: &mut Vec<String>) -> Option<Finish> {
        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(json) => json,
            Err(_) if event == "error" => {
                return Some(Finish::Error(LlmError::Stream(data.to_string())));
            }
            Err(e) => {
                tracing::trace!("Skipping malformed frame: {}", e);
                return None;
            }
        };

        let index = json.get("index").and_then(|i| i.as_u64());

        match json.get("type").and_then(|t| t.as_str()).unwrap_or(event) {
            "content_block_start" => {
                let block_type = json
                    .get("content_block")
                    .and_then(|b| b.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                self.open_block = index;
                self.suppress = matches!(block_type, "thinking" | "redacted_thinking");
                None
            }
            "content_block_stop" => {
                if index == self.open_block {
                    self.open_block = None;
                    self.suppress = false;
                }
                None
            }
            "content_block_delta" => {
                if !self.suppress {
                    if let Some(text) = json
                        .get("delta")
                        .and_then(|d| d.get("text"))
                        .and_then(|t| t.as_str())
                    {
                        if !text.is_empty() {
                            out.push(text.to_string());
                        }
                    }
                }
                None
            }
            "message_stop" => Some(Finish::Done),
            "error" => {
                let message = error_message(&json).unwrap_or_else(|| "Unknown error".to_string());
                Some(Finish::Error(LlmError::Stream(message)))
            }
            _ => None,
        }
    }
}
