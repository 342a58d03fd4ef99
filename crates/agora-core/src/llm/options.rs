//! Sampling options and their default policy

use super::ProviderKind;
use serde::{Deserialize, Serialize};

/// Sampling parameters for one chat call.
///
/// Every field is optional: `None` means "not set" and falls through to the
/// next tier, while `Some(0.0)` is a deliberate zero that must be forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl ChatOptions {
    /// Overlay `self` on top of `defaults`; fields set on `self` win.
    pub fn merge(&self, defaults: &ChatOptions) -> ChatOptions {
        ChatOptions {
            temperature: self.temperature.or(defaults.temperature),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            top_p: self.top_p.or(defaults.top_p),
            top_k: self.top_k.or(defaults.top_k),
            frequency_penalty: self.frequency_penalty.or(defaults.frequency_penalty),
            presence_penalty: self.presence_penalty.or(defaults.presence_penalty),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// True when no option is set
    pub fn is_empty(&self) -> bool {
        *self == ChatOptions::default()
    }
}

/// Model-name substrings that mark extended-reasoning models, with the
/// output ceiling each wire family needs for them.
const REASONING_CEILINGS: &[(&str, u32, u32)] = &[
    // (substring, anthropic/openai-family ceiling, gemini ceiling)
    ("thinking", 64_000, 16_000),
    ("opus-4", 64_000, 8_192),
];

/// Adapter-level default for max output tokens.
///
/// Returns `None` when the upstream should pick its own ceiling.
pub fn default_max_tokens(kind: ProviderKind, model: &str) -> Option<u32> {
    let model = model.to_lowercase();

    if kind == ProviderKind::Ollama {
        return None;
    }

    for (needle, chat_ceiling, gemini_ceiling) in REASONING_CEILINGS {
        if model.contains(needle) {
            return Some(match kind {
                ProviderKind::Gemini => *gemini_ceiling,
                _ => *chat_ceiling,
            });
        }
    }

    Some(match kind {
        ProviderKind::Gemini => 8_192,
        _ => 4_096,
    })
}
