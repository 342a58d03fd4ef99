//! Configuration loader with environment variable expansion
//!
//! Loads configuration from `agora.toml` in the working directory, the path in
//! `AGORA_CONFIG`, or the user config directory.

use super::types::AgoraConfig;
use crate::error::AgoraError;
use crate::llm::ProviderKind;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl From<ConfigError> for AgoraError {
    fn from(err: ConfigError) -> Self {
        AgoraError::config(err.to_string())
    }
}

/// Find the config file to use, if any.
///
/// Priority order:
/// 1. `AGORA_CONFIG`
/// 2. `agora.toml` in the working directory
/// 3. `~/.config/agora/config.toml`
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AGORA_CONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from("agora.toml");
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|d| d.join("agora").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration from `path`, or built-in defaults when there is none.
pub fn load_config(path: Option<&Path>) -> Result<AgoraConfig, ConfigError> {
    match path {
        Some(path) => load_from_file(path),
        None => Ok(apply_env_overrides(AgoraConfig::default(), env_lookup)),
    }
}

/// Load configuration from a specific file
pub fn load_from_file(path: &Path) -> Result<AgoraConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AgoraConfig = toml::from_str(&content)?;

    // Expand environment variables in the config
    expand_env_vars(&mut config);

    // Apply environment variable overrides
    config = apply_env_overrides(config, env_lookup);

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Expand ${VAR} patterns in credentials and URLs
fn expand_env_vars(config: &mut AgoraConfig) {
    for provider in config.providers.values_mut() {
        provider.api_key = expand_string(&provider.api_key);
        provider.base_url = expand_string(&provider.base_url);
    }
    for agent in &mut config.agents {
        agent.api_key = expand_string(&agent.api_key);
        agent.base_url = expand_string(&agent.base_url);
    }
}

/// Expand environment variables in a single string; unknown ones stay as-is
fn expand_string(s: &str) -> String {
    ENV_VAR
        .replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .to_string()
}

/// Apply environment variable overrides for common settings
///
/// Supports direct environment variables:
/// - OPENAI_API_KEY -> providers.openai.api_key
/// - ANTHROPIC_API_KEY -> providers.anthropic.api_key
/// - GOOGLE_API_KEY / GEMINI_API_KEY -> providers.gemini.api_key
/// - XAI_API_KEY, DEEPSEEK_API_KEY, PERPLEXITY_API_KEY
/// - OLLAMA_BASE_URL -> providers.ollama.base_url
/// - PORT -> server.port
/// - AGORA_DEFAULT_PROVIDER -> gateway.default_provider
fn apply_env_overrides(
    mut config: AgoraConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> AgoraConfig {
    let key_vars: [(ProviderKind, &[&str]); 6] = [
        (ProviderKind::OpenAi, &["OPENAI_API_KEY"]),
        (ProviderKind::Anthropic, &["ANTHROPIC_API_KEY"]),
        (ProviderKind::Gemini, &["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
        (ProviderKind::Grok, &["XAI_API_KEY"]),
        (ProviderKind::DeepSeek, &["DEEPSEEK_API_KEY"]),
        (ProviderKind::Perplexity, &["PERPLEXITY_API_KEY"]),
    ];

    for (kind, vars) in key_vars {
        if let Some(key) = vars.iter().find_map(|v| lookup(v)) {
            config.provider_mut(kind).api_key = key;
        }
    }

    // Ollama base URL override
    if let Some(url) = lookup("OLLAMA_BASE_URL") {
        config.provider_mut(ProviderKind::Ollama).base_url = url;
    }

    if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }

    // Default provider override
    if let Some(provider) = lookup("AGORA_DEFAULT_PROVIDER") {
        config.gateway.default_provider = provider;
    }

    config
}

/// Create a sample configuration file content
pub fn sample_config() -> &'static str {
    r##"# Agora Configuration
# Place this file in the working directory as agora.toml,
# point AGORA_CONFIG at it, or use ~/.config/agora/config.toml

[server]
port = 8080

[gateway]
# Provider used by /v1/chat/completions when the request names none
default_provider = "openai"
enable_logging = true

[providers.openai]
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
api_key = "${ANTHROPIC_API_KEY}"

[providers.gemini]
api_key = "${GEMINI_API_KEY}"

[providers.ollama]
base_url = "http://localhost:11434"

[[agents]]
id = "analyst"
name = "Analyst"
role = "Logical, data-driven analysis"
provider = "openai"
model = "gpt-4"
color = "#4A90D9"
temperature = 0.7
system_prompt = "You are Analyst, an expert in logical and data-driven analysis."

[[agents]]
id = "critic"
name = "Critic"
role = "Challenges arguments, finds gaps"
provider = "anthropic"
model = "claude-3-5-sonnet-20241022"
color = "#E74C3C"
system_prompt = "You are Critic, a sharp and constructive sceptic."
"##
}
