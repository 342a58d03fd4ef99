//! Ollama LLM provider
//!
//! Connects to a local Ollama instance. The response body is NDJSON, one
//! object per line.

use super::{
    error_message, registry::http_client, spawn_stream, ChatMessage, ChatOptions, Finish,
    FrameDecoder, Framing, LlmError, LlmProvider, LlmStream, ProviderConfig,
};
use tokio_util::sync::CancellationToken;

/// Ollama provider for local LLM inference
pub struct OllamaProvider {
    /// Base URL for Ollama API
    base_url: String,

    model: String,

    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url(),
            model: config.model(),
            client: http_client(),
        }
    }

    fn request_body(&self, messages: &[ChatMessage], options: &ChatOptions) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(|m| {
                serde_json::json!({
                    "role": m.role_str(),
                    "content": m.content
                })
            }).collect::<Vec<_>>(),
            "stream": true
        });

        // Only send an options object when something is set
        let mut opts = serde_json::Map::new();
        if let Some(max_tokens) = options.max_tokens {
            opts.insert("num_predict".into(), max_tokens.into());
        }
        if let Some(temperature) = options.temperature {
            opts.insert("temperature".into(), temperature.into());
        }
        if let Some(top_p) = options.top_p {
            opts.insert("top_p".into(), top_p.into());
        }
        if let Some(top_k) = options.top_k {
            opts.insert("top_k".into(), top_k.into());
        }
        if let Some(penalty) = options.frequency_penalty {
            opts.insert("frequency_penalty".into(), penalty.into());
        }
        if let Some(penalty) = options.presence_penalty {
            opts.insert("presence_penalty".into(), penalty.into());
        }
        if !opts.is_empty() {
            body["options"] = serde_json::Value::Object(opts);
        }

        body
    }
}

impl LlmProvider for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    fn name(&self) -> &str {
        "Ollama"
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
            "Ollama chat: model={} messages={}",
            self.model,
            messages.len()
        );

        let body = self.request_body(&messages, options);
        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body);

        spawn_stream(request, OllamaDecoder, cancel)
    }
}

/// Decodes NDJSON `{message:{content}, done}` lines
pub(crate) struct OllamaDecoder;

impl FrameDecoder for OllamaDecoder {
    const FRAMING: Framing = Framing::Lines;

    fn decode(&mut self, _event: &str, line: &str, out: &mut Vec<String>) -> Option<Finish> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let json: serde_json::Value = match serde_json::from_str(line) {
            Ok(json) => json,
            Err(e) => {
                tracing::trace!("Skipping malformed line: {}", e);
                return None;
            }
        };

        if let Some(message) = error_message(&json) {
            return Some(Finish::Error(LlmError::Stream(message)));
        }

        if let Some(content) = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
        {
            if !content.is_empty() {
                out.push(content.to_string());
            }
        }

        if json.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Some(Finish::Done);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;

    #[test]
    fn test_decodes_ndjson() {
        let mut decoder = OllamaDecoder;
        let mut out = Vec::new();
        assert!(decoder
            .decode("", r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#, &mut out)
            .is_none());
        let finish =
            decoder.decode("", r#"{"message":{"role":"assistant","content":""},"done":true}"#, &mut out);
        assert!(matches!(finish, Some(Finish::Done)));
        assert_eq!(out, vec!["Hi"]);
    }

    #[test]
    fn test_options_only_when_set() {
        let provider = OllamaProvider::new(&ProviderConfig::new(ProviderKind::Ollama));
        let body = provider.request_body(&[ChatMessage::user("hi")], &ChatOptions::default());
        assert!(body.get("options").is_none());

        let body = provider.request_body(
            &[ChatMessage::user("hi")],
            &ChatOptions::default().with_max_tokens(256),
        );
        assert_eq!(body["options"]["num_predict"], 256);
    }
}
