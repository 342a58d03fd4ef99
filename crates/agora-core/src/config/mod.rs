//! Configuration module for Agora
//!
//! Handles loading and parsing of `agora.toml` configuration files
//! with support for environment variable expansion.

mod loader;
mod types;

pub use loader::{load_config, load_from_file, resolve_config_path, sample_config, ConfigError};
pub use types::{AgoraConfig, ProviderSection, ServerConfig};
