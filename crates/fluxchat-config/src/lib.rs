//! # Fluxchat Config
//!
//! Single-file configuration for a fluxchat client. One `fluxchat.yaml`
//! configures the app identity, the completion provider, credential naming,
//! and routing defaults. The core crates never read configuration
//! implicitly; bootstrap code loads it and injects values.

mod loader;

pub use loader::{load_config, parse_config, ConfigError};

use serde::Deserialize;

/// Top-level configuration schema.
#[derive(Debug, Clone, Deserialize)]
pub struct FluxchatConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

fn default_version() -> u32 {
    1
}

/// App identity.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
}

fn default_app_name() -> String {
    "fluxchat".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

/// Completion provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider backend identifier (e.g. "openai").
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Model name requested for completions.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            request_timeout_secs: default_timeout(),
        }
    }
}

/// Credential naming.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Entry name under which the provider key is stored.
    #[serde(default = "default_api_key_name")]
    pub api_key_name: String,
}

fn default_api_key_name() -> String {
    "api_key".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key_name: default_api_key_name(),
        }
    }
}

/// Routing defaults for bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Route activated after startup.
    #[serde(default = "default_root_next")]
    pub initial_route: String,
    /// Splash dwell before the initial route, in milliseconds.
    #[serde(default = "default_splash_delay")]
    pub splash_delay_ms: u64,
}

fn default_root_next() -> String {
    "/chat".to_string()
}

fn default_splash_delay() -> u64 {
    3000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            initial_route: default_root_next(),
            splash_delay_ms: default_splash_delay(),
        }
    }
}
