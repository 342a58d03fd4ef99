//! Debate agents
//!
//! An [`Agent`] pairs an identity (name, role, color) and a system prompt with
//! one provider adapter and its default sampling options.

use crate::error::{AgoraError, Result};
use crate::llm::{
    create_provider, ChatMessage, ChatOptions, LlmStream, ProviderConfig, ProviderKind,
    SharedProvider,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Agent definition as it appears in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub system_prompt: String,

    /// Provider kind string, e.g. "openai" or "claude"
    pub provider: String,

    /// Empty means the provider's default model
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub color: String,

    /// Supports `${ENV_VAR}` syntax; empty inherits from `[providers.<kind>]`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,

    /// Default sampling options
    #[serde(default, flatten)]
    pub options: ChatOptions,
}

impl AgentConfig {
    /// Resolve the adapter settings for this agent
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let kind: ProviderKind = self
            .provider
            .parse()
            .map_err(|e| AgoraError::config(format!("agent '{}': {}", self.id, e)))?;

        let mut config = ProviderConfig::new(kind).with_api_key(&self.api_key);
        if !self.base_url.is_empty() {
            config = config.with_base_url(&self.base_url);
        }
        if !self.model.is_empty() {
            config = config.with_model(&self.model);
        }
        Ok(config)
    }
}

/// Public view of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub role: String,
    pub color: String,
}

/// A configured debate participant
pub struct Agent {
    info: AgentInfo,
    system_prompt: String,
    defaults: ChatOptions,
    provider: SharedProvider,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.info.id)
            .field("provider", &self.provider.id())
            .field("model", &self.provider.model())
            .finish()
    }
}

impl Agent {
    /// Build an agent and its adapter from configuration
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let provider = create_provider(&config.provider_config()?)?;
        Ok(Self::new(
            AgentInfo {
                id: config.id.clone(),
                name: config.name.clone(),
                role: config.role.clone(),
                color: config.color.clone(),
            },
            config.system_prompt.clone(),
            config.options.clone(),
            provider,
        ))
    }

    /// Build an agent around an existing provider
    pub fn new(
        info: AgentInfo,
        system_prompt: impl Into<String>,
        defaults: ChatOptions,
        provider: SharedProvider,
    ) -> Self {
        Self {
            info,
            system_prompt: system_prompt.into(),
            defaults,
            provider,
        }
    }

    pub fn info(&self) -> &AgentInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn color(&self) -> &str {
        &self.info.color
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    /// Full message list sent upstream for `prior`
    fn conversation(&self, prior: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if self.system_prompt.is_empty() {
            return prior;
        }
        let mut messages = Vec::with_capacity(prior.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend(prior);
        messages
    }

    /// Ask this agent to speak.
    ///
    /// Options set on `options` win over the agent's defaults; anything left
    /// unset is decided by the adapter.
    pub fn respond(
        &self,
        prior: Vec<ChatMessage>,
        options: &ChatOptions,
        cancel: CancellationToken,
    ) -> LlmStream {
        let merged = options.merge(&self.defaults);
        self.provider.chat(self.conversation(prior), &merged, cancel)
    }
}

/// Build a roster, logging and skipping agents that cannot be constructed.
pub fn build_roster(configs: &[AgentConfig]) -> Vec<Arc<Agent>> {
    let roster: Vec<Arc<Agent>> = configs
        .iter()
        .filter_map(|config| match Agent::from_config(config) {
            Ok(agent) => Some(Arc::new(agent)),
            Err(e) => {
                tracing::error!("Skipping agent '{}': {}", config.id, e);
                None
            }
        })
        .collect();

    if roster.is_empty() {
        tracing::warn!("Agent roster is empty");
    } else {
        tracing::info!("Loaded {} agents", roster.len());
    }
    roster
}

fn default_agent(
    id: &str,
    name: &str,
    role: &str,
    system_prompt: &str,
    provider: ProviderKind,
    color: &str,
) -> AgentConfig {
    AgentConfig {
        id: id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        system_prompt: system_prompt.to_string(),
        provider: provider.as_str().to_string(),
        model: provider.default_model().to_string(),
        color: color.to_string(),
        api_key: String::new(),
        base_url: String::new(),
        options: ChatOptions::default(),
    }
}

/// The built-in four-agent panel
pub fn default_agents() -> Vec<AgentConfig> {
    vec![
        default_agent(
            "analyst",
            "Analyst",
            "Logical, data-driven analysis",
            "You are Analyst, an expert in logical and data-driven analysis.\n\
             Your role:\n\
             - Analyse the problem logically and systematically\n\
             - Ground your arguments in data and evidence\n\
             - Weigh the different sides of the issue\n\
             - Keep answers short and focused on the reasoning\n\n\
             When joining the discussion:\n\
             1. Examine the points made so far\n\
             2. Offer your analytical perspective\n\
             3. Support it with logic and data where you can",
            ProviderKind::OpenAi,
            "#4A90D9",
        ),
        default_agent(
            "creative",
            "Creative",
            "Inventive, brings new ideas",
            "You are Creative, an inventive and original thinker.\n\
             Your role:\n\
             - Propose new and unusual ideas\n\
             - Think outside the usual frame\n\
             - Look for creative solutions\n\
             - Connect ideas from different places\n\n\
             When joining the discussion:\n\
             1. Offer a fresh angle\n\
             2. Suggest creative ideas\n\
             3. Widen what seems possible",
            ProviderKind::Anthropic,
            "#9B59B6",
        ),
        default_agent(
            "critic",
            "Critic",
            "Challenges arguments, finds gaps",
            "You are Critic, a sharp and constructive sceptic.\n\
             Your role:\n\
             - Find weaknesses and gaps in the arguments\n\
             - Question the underlying assumptions\n\
             - Give constructive counter-arguments\n\
             - Help strengthen and refine the ideas\n\n\
             When joining the discussion:\n\
             1. Assess the opinions critically\n\
             2. Point out what has not been considered\n\
             3. Suggest how the problems could be fixed",
            ProviderKind::Gemini,
            "#E74C3C",
        ),
        default_agent(
            "synthesizer",
            "Synthesizer",
            "Synthesises views, finds common ground",
            "You are Synthesizer, a mediator who brings views together.\n\
             Your role:\n\
             - Summarise the different opinions\n\
             - Find common ground between positions\n\
             - Build consensus\n\
             - Propose integrated solutions\n\n\
             When joining the discussion:\n\
             1. Recap the points raised so far\n\
             2. Name the strengths of each position\n\
             3. Propose a combined way forward",
            ProviderKind::Ollama,
            "#27AE60",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmEvent, LlmProvider};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    /// Records what it was asked and answers with a fixed chunk
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(Vec<ChatMessage>, ChatOptions)>>,
    }

    impl LlmProvider for RecordingProvider {
        fn id(&self) -> &str {
            "recording"
        }

        fn name(&self) -> &str {
            "Recording"
        }

        fn model(&self) -> String {
            "test".into()
        }

        fn chat(
            &self,
            messages: Vec<ChatMessage>,
            options: &ChatOptions,
            _cancel: CancellationToken,
        ) -> LlmStream {
            self.calls.lock().push((messages, options.clone()));
            let (tx, rx) = mpsc::channel(4);
            let _ = tx.try_send(LlmEvent::Chunk("ok".into()));
            let _ = tx.try_send(LlmEvent::Done);
            rx
        }
    }

    fn info() -> AgentInfo {
        AgentInfo {
            id: "a".into(),
            name: "A".into(),
            role: "tester".into(),
            color: "#000".into(),
        }
    }

    #[tokio::test]
    async fn test_respond_prepends_system_and_merges() {
        let provider = Arc::new(RecordingProvider::default());
        let agent = Agent::new(
            info(),
            "be brief",
            ChatOptions::default().with_temperature(0.9).with_max_tokens(300),
            provider.clone(),
        );

        let mut rx = agent.respond(
            vec![ChatMessage::user("topic")],
            &ChatOptions::default().with_temperature(0.0),
            CancellationToken::new(),
        );
        assert_eq!(rx.recv().await, Some(LlmEvent::Chunk("ok".into())));

        let calls = provider.calls.lock();
        let (messages, options) = &calls[0];
        assert_eq!(messages[0], ChatMessage::system("be brief"));
        assert_eq!(messages[1], ChatMessage::user("topic"));
        assert_eq!(options.temperature, Some(0.0));
        assert_eq!(options.max_tokens, Some(300));
    }

    #[tokio::test]
    async fn test_empty_system_prompt_not_sent() {
        let provider = Arc::new(RecordingProvider::default());
        let agent = Agent::new(info(), "", ChatOptions::default(), provider.clone());
        let _rx = agent.respond(vec![], &ChatOptions::default(), CancellationToken::new());
        assert!(provider.calls.lock()[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_build_roster_skips_unknown_provider() {
        let mut configs = default_agents();
        configs[1].provider = "mystery".into();
        let roster = build_roster(&configs);
        let ids: Vec<&str> = roster.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["analyst", "critic", "synthesizer"]);
    }

    #[test]
    fn test_config_from_toml_with_options() {
        let config: AgentConfig = toml::from_str(
            r##"
            id = "judge"
            name = "Judge"
            provider = "claude"
            temperature = 0.0
            max_tokens = 1000
            color = "#123456"
            "##,
        )
        .unwrap();
        assert_eq!(config.options.temperature, Some(0.0));
        assert_eq!(config.options.max_tokens, Some(1000));
        assert_eq!(config.options.top_p, None);

        let provider = config.provider_config().unwrap();
        assert_eq!(provider.kind, ProviderKind::Anthropic);
        assert_eq!(provider.model(), "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn test_default_agents() {
        let agents = default_agents();
        let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["analyst", "creative", "critic", "synthesizer"]);
        assert_eq!(agents[3].model, "llama2");
        assert_eq!(agents[0].color, "#4A90D9");
    }
}
