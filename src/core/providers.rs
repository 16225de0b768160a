//! Built-in provider registry
//!
//! This module loads the provider/model lookup table embedded from
//! providers.toml and resolves credentials for a chosen provider.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub mode: Option<String>,
    pub api_key_env: String,
    pub models: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    /// Get the wire/auth mode for this provider
    pub fn auth_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("openai")
    }

    /// Check if this provider uses Anthropic-style authentication
    pub fn is_anthropic_mode(&self) -> bool {
        self.auth_mode() == "anthropic"
    }

    /// First listed model; the registry guarantees a non-empty list.
    pub fn default_model(&self) -> &str {
        self.models
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> Vec<BuiltinProvider> {
    const CONFIG_CONTENT: &str = include_str!("../providers.toml");

    let config: BuiltinProvidersConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse providers.toml");

    config.providers
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<BuiltinProvider> {
    load_builtin_providers()
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Keep `model` when the provider lists it, otherwise fall back to the
/// provider's first listed model. Unknown provider ids are an error; the
/// caller keeps its previous configuration in that case.
pub fn reconcile_model(provider_id: &str, model: &str) -> Result<String, ProviderResolutionError> {
    let provider = find_builtin_provider(provider_id)
        .ok_or_else(|| ProviderResolutionError::unknown_provider(provider_id))?;

    if provider.supports_model(model) {
        Ok(model.to_string())
    } else {
        Ok(provider.default_model().to_string())
    }
}

/// Resolve the credential for a provider: an explicit config value wins,
/// then the provider's environment variable, then the call is refused.
pub fn resolve_credential(
    provider: &BuiltinProvider,
    explicit: Option<&str>,
) -> Result<String, ProviderResolutionError> {
    if let Some(key) = explicit.filter(|value| !value.is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(&provider.api_key_env)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProviderResolutionError::missing_credential(provider))
}

#[derive(Debug)]
pub struct ProviderResolutionError {
    message: String,
}

impl ProviderResolutionError {
    pub fn unknown_provider(id: &str) -> Self {
        let known: Vec<String> = load_builtin_providers().into_iter().map(|p| p.id).collect();
        Self {
            message: format!(
                "Unknown provider '{}'. Available providers: {}",
                id,
                known.join(", ")
            ),
        }
    }

    pub fn missing_credential(provider: &BuiltinProvider) -> Self {
        Self {
            message: format!(
                "No API key configured for {}. Export {} and try again",
                provider.display_name, provider.api_key_env
            ),
        }
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::EnvVarGuard;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers();
        assert!(!providers.is_empty());

        let provider_ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert!(provider_ids.contains(&"openai"));
        assert!(provider_ids.contains(&"anthropic"));
        assert!(provider_ids.contains(&"openrouter"));
    }

    #[test]
    fn test_find_builtin_provider() {
        let provider = find_builtin_provider("OpenAI");
        assert!(provider.is_some());
        assert_eq!(provider.unwrap().id, "openai");

        let provider = find_builtin_provider("anthropic");
        assert!(provider.is_some());
        assert_eq!(provider.unwrap().display_name, "Anthropic");

        let provider = find_builtin_provider("nonexistent");
        assert!(provider.is_none());
    }

    #[test]
    fn test_anthropic_mode() {
        let anthropic = find_builtin_provider("anthropic").unwrap();
        assert!(anthropic.is_anthropic_mode());

        let openai = find_builtin_provider("openai").unwrap();
        assert!(!openai.is_anthropic_mode());
        assert_eq!(openai.auth_mode(), "openai");
    }

    #[test]
    fn test_provider_properties() {
        for provider in load_builtin_providers() {
            assert!(!provider.id.is_empty());
            assert!(!provider.display_name.is_empty());
            assert!(!provider.api_key_env.is_empty());
            assert!(provider.base_url.starts_with("https://"));
            assert!(!provider.models.is_empty());
            assert_eq!(provider.default_model(), provider.models[0]);
        }
    }

    #[test]
    fn reconcile_keeps_listed_models() {
        let model = reconcile_model("openai", "gpt-4o-mini").unwrap();
        assert_eq!(model, "gpt-4o-mini");
    }

    #[test]
    fn reconcile_replaces_foreign_models_with_first_listed() {
        let anthropic = find_builtin_provider("anthropic").unwrap();
        let model = reconcile_model("anthropic", "gpt-4o").unwrap();
        assert_eq!(model, anthropic.models[0]);
        assert!(anthropic.supports_model(&model));
    }

    #[test]
    fn reconcile_rejects_unknown_providers() {
        let err = reconcile_model("nonexistent", "gpt-4o").unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn explicit_credential_wins_over_env() {
        let provider = find_builtin_provider("openai").unwrap();
        let mut guard = EnvVarGuard::new();
        guard.set_var("OPENAI_API_KEY", "sk-env");

        let key = resolve_credential(&provider, Some("sk-explicit")).unwrap();
        assert_eq!(key, "sk-explicit");
    }

    #[test]
    fn env_credential_is_the_fallback() {
        let provider = find_builtin_provider("openai").unwrap();
        let mut guard = EnvVarGuard::new();
        guard.set_var("OPENAI_API_KEY", "sk-env");

        let key = resolve_credential(&provider, None).unwrap();
        assert_eq!(key, "sk-env");
    }

    #[test]
    fn missing_credential_is_refused() {
        let provider = find_builtin_provider("openai").unwrap();
        let mut guard = EnvVarGuard::new();
        guard.remove_var("OPENAI_API_KEY");

        let err = resolve_credential(&provider, None).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
