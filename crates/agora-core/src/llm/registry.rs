//! Provider kinds and the factory that turns a config into an adapter

use super::{
    AnthropicProvider, GeminiProvider, LlmError, OllamaProvider, OpenAiProvider, SharedProvider,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Upstream provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    #[serde(alias = "claude")]
    Anthropic,
    #[serde(alias = "google")]
    Gemini,
    Ollama,
    #[serde(alias = "xai")]
    Grok,
    DeepSeek,
    Perplexity,
}

/// How the API key reaches the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `x-api-key: <key>` plus `anthropic-version`
    ApiKeyHeader,
    /// `?key=<key>` query parameter
    QueryParam,
    /// No credentials
    None,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
        ProviderKind::Grok,
        ProviderKind::DeepSeek,
        ProviderKind::Perplexity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Grok => "grok",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Perplexity => "perplexity",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Ollama => "Ollama",
            ProviderKind::Grok => "Grok",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Perplexity => "Perplexity",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::Grok => "https://api.x.ai/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
            ProviderKind::Perplexity => "https://api.perplexity.ai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Gemini => "gemini-pro",
            ProviderKind::Ollama => "llama2",
            ProviderKind::Grok => "grok-beta",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Perplexity => "llama-3.1-sonar-small-128k-online",
        }
    }

    pub fn auth_style(&self) -> AuthStyle {
        match self {
            ProviderKind::Anthropic => AuthStyle::ApiKeyHeader,
            ProviderKind::Gemini => AuthStyle::QueryParam,
            ProviderKind::Ollama => AuthStyle::None,
            _ => AuthStyle::Bearer,
        }
    }

    /// Local daemons run without credentials
    pub fn requires_api_key(&self) -> bool {
        *self != ProviderKind::Ollama
    }

    /// Speaks the OpenAI chat-completions protocol
    pub fn is_openai_compatible(&self) -> bool {
        matches!(
            self,
            ProviderKind::OpenAi
                | ProviderKind::Grok
                | ProviderKind::DeepSeek
                | ProviderKind::Perplexity
        )
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            "grok" | "xai" => Ok(ProviderKind::Grok),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "perplexity" => Ok(ProviderKind::Perplexity),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }
}

/// Resolved connection settings for one adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// May be empty for local daemons
    pub api_key: String,

    /// Overrides the kind's default base URL
    pub base_url: Option<String>,

    /// Overrides the kind's default model
    pub model: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: String::new(),
            base_url: None,
            model: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.kind.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn model(&self) -> String {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.kind.default_model())
            .to_string()
    }
}

/// HTTP client shared by the adapters' requests.
///
/// Only the connect phase is bounded; streamed bodies may run for minutes.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Build the adapter for `config`.
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider, LlmError> {
    let provider: SharedProvider = match config.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config)),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config)),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)),
        kind if kind.is_openai_compatible() => Arc::new(OpenAiProvider::new(config)),
        kind => return Err(LlmError::UnknownProvider(kind.to_string())),
    };

    tracing::debug!(
        "Created {} provider for model {}",
        provider.name(),
        provider.model()
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("Google".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("xai".parse::<ProviderKind>().unwrap(), ProviderKind::Grok);
        assert!(matches!(
            "mistral".parse::<ProviderKind>(),
            Err(LlmError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_kind_serde_alias() {
        let kind: ProviderKind = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert_eq!(serde_json::to_string(&ProviderKind::DeepSeek).unwrap(), "\"deepseek\"");
    }

    #[test]
    fn test_config_defaults() {
        let config = ProviderConfig::new(ProviderKind::Grok);
        assert_eq!(config.base_url(), "https://api.x.ai/v1");
        assert_eq!(config.model(), "grok-beta");

        let config = ProviderConfig::new(ProviderKind::Ollama)
            .with_base_url("http://10.0.0.2:11434/")
            .with_model("");
        assert_eq!(config.base_url(), "http://10.0.0.2:11434");
        assert_eq!(config.model(), "llama2");
    }

    #[test]
    fn test_auth_styles() {
        assert_eq!(ProviderKind::Anthropic.auth_style(), AuthStyle::ApiKeyHeader);
        assert_eq!(ProviderKind::Gemini.auth_style(), AuthStyle::QueryParam);
        assert_eq!(ProviderKind::Perplexity.auth_style(), AuthStyle::Bearer);
        assert!(!ProviderKind::Ollama.requires_api_key());
    }

    #[tokio::test]
    async fn test_factory_builds_every_kind() {
        for kind in ProviderKind::ALL {
            let provider = create_provider(&ProviderConfig::new(kind)).unwrap();
            assert_eq!(provider.id(), kind.as_str());
            assert_eq!(provider.model(), kind.default_model());
        }
    }
}
