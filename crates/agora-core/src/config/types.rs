//! Configuration types for Agora
//!
//! Defines the structure of `agora.toml`.

use crate::agent::{default_agents, AgentConfig};
use crate::gateway::GatewaySettings;
use crate::llm::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgoraConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Gateway defaults
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Shared provider credentials, keyed by provider kind string
    #[serde(default)]
    pub providers: HashMap<String, ProviderSection>,

    /// Debate roster
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
}

impl Default for AgoraConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gateway: GatewaySettings::default(),
            providers: HashMap::new(),
            agents: default_agents(),
        }
    }
}

/// HTTP server section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Credentials and endpoint for one provider kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSection {
    /// API key (supports ${ENV_VAR} syntax)
    #[serde(default)]
    pub api_key: String,

    /// Base URL override
    #[serde(default)]
    pub base_url: String,

    /// Model used when a request does not name one
    #[serde(default)]
    pub model: String,
}

impl AgoraConfig {
    /// Provider section for `kind`, accepting aliased keys such as `claude`
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderSection> {
        self.providers
            .iter()
            .find(|(key, _)| key.parse::<ProviderKind>().ok() == Some(kind))
            .map(|(_, section)| section)
    }

    pub(crate) fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderSection {
        let key = self
            .providers
            .keys()
            .find(|key| key.parse::<ProviderKind>().ok() == Some(kind))
            .cloned()
            .unwrap_or_else(|| kind.as_str().to_string());
        self.providers.entry(key).or_default()
    }

    /// Provider sections with recognised kinds. Unknown keys are logged.
    pub fn provider_sections(&self) -> HashMap<ProviderKind, ProviderSection> {
        let mut sections = HashMap::new();
        for (key, section) in &self.providers {
            match key.parse::<ProviderKind>() {
                Ok(kind) => {
                    sections.insert(kind, section.clone());
                }
                Err(e) => tracing::warn!("Ignoring [providers.{}]: {}", key, e),
            }
        }
        sections
    }

    /// Agent configs with empty credentials filled from their provider section
    pub fn resolved_agents(&self) -> Vec<AgentConfig> {
        self.agents
            .iter()
            .map(|agent| {
                let mut agent = agent.clone();
                let section = agent
                    .provider
                    .parse::<ProviderKind>()
                    .ok()
                    .and_then(|kind| self.provider(kind));
                if let Some(section) = section {
                    if agent.api_key.is_empty() {
                        agent.api_key = section.api_key.clone();
                    }
                    if agent.base_url.is_empty() {
                        agent.base_url = section.base_url.clone();
                    }
                    if agent.model.is_empty() {
                        agent.model = section.model.clone();
                    }
                }
                agent
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgoraConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gateway.default_provider, "openai");
        assert_eq!(config.agents.len(), 4);
    }

    #[test]
    fn test_provider_lookup_accepts_alias() {
        let mut config = AgoraConfig::default();
        config.providers.insert(
            "claude".into(),
            ProviderSection {
                api_key: "sk-ant".into(),
                ..Default::default()
            },
        );
        assert_eq!(
            config.provider(ProviderKind::Anthropic).map(|s| s.api_key.as_str()),
            Some("sk-ant")
        );

        config.provider_mut(ProviderKind::Anthropic).model = "claude-x".into();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers["claude"].model, "claude-x");
    }

    #[test]
    fn test_resolved_agents_inherit_credentials() {
        let mut config = AgoraConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderSection {
                api_key: "sk-shared".into(),
                base_url: "http://proxy.local/v1".into(),
                model: String::new(),
            },
        );
        config.agents[0].api_key = String::new();

        let agents = config.resolved_agents();
        assert_eq!(agents[0].api_key, "sk-shared");
        assert_eq!(agents[0].base_url, "http://proxy.local/v1");
        assert_eq!(agents[0].model, "gpt-4");
        assert_eq!(agents[1].api_key, "");
    }
}
