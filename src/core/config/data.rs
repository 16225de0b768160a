use crate::core::providers::{find_builtin_provider, ProviderResolutionError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// On-disk encoding for saved transcripts.
///
/// Parsing is total: anything that is not a recognized markdown spelling
/// falls back to JSON, so a stale or hand-edited config value can never
/// switch the encoding by surprise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SaveFormat {
    #[default]
    Json,
    Markdown,
}

impl SaveFormat {
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "markdown" | "md" => SaveFormat::Markdown,
            _ => SaveFormat::Json,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SaveFormat::Json => "json",
            SaveFormat::Markdown => "markdown",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Json => "json",
            SaveFormat::Markdown => "md",
        }
    }
}

impl From<String> for SaveFormat {
    fn from(value: String) -> Self {
        SaveFormat::from_str(&value)
    }
}

impl From<SaveFormat> for String {
    fn from(value: SaveFormat) -> Self {
        value.as_str().to_string()
    }
}

/// The live configuration of one chat session.
///
/// Owned by the session service; callers only ever see cloned snapshots.
/// All fields are owned values, so a clone shares no mutable structure
/// with the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub save_directory: Option<PathBuf>,
    pub save_format: SaveFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let model = find_builtin_provider(DEFAULT_PROVIDER)
            .map(|p| p.default_model().to_string())
            .unwrap_or_default();
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model,
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            save_directory: None,
            save_format: SaveFormat::Json,
        }
    }
}

impl SessionConfig {
    /// Merge a patch over this config, producing a fresh config. Only
    /// fields the patch explicitly carries are replaced.
    pub fn merged(&self, patch: &ConfigPatch) -> SessionConfig {
        let mut next = self.clone();
        if let Some(provider) = &patch.provider {
            next.provider = provider.clone();
        }
        if let Some(model) = &patch.model {
            next.model = model.clone();
        }
        if let Some(api_key) = &patch.api_key {
            next.api_key = Some(api_key.clone());
        }
        if let Some(temperature) = patch.temperature {
            next.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            next.max_tokens = max_tokens;
        }
        if let Some(system_prompt) = &patch.system_prompt {
            next.system_prompt = system_prompt.clone();
        }
        if let Some(save_directory) = &patch.save_directory {
            next.save_directory = Some(save_directory.clone());
        }
        if let Some(save_format) = patch.save_format {
            next.save_format = save_format;
        }
        next
    }

    /// True when switching from `previous` to this config invalidates the
    /// bound provider client. The system prompt and save settings are
    /// orthogonal to the network binding and never force a rebind.
    pub fn rebind_required(&self, previous: &SessionConfig) -> bool {
        self.provider != previous.provider
            || self.model != previous.model
            || self.api_key != previous.api_key
            || self.temperature != previous.temperature
            || self.max_tokens != previous.max_tokens
    }
}

/// Partial update over a [`SessionConfig`]. `None` means "leave alone";
/// `system_prompt` is doubly optional so a patch can also clear it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<Option<String>>,
    pub save_directory: Option<PathBuf>,
    pub save_format: Option<SaveFormat>,
}

/// Parse free-text temperature input, falling back to the default on
/// anything unparseable. Invalid input is never an error.
pub fn coerce_temperature(input: &str) -> f64 {
    input.trim().parse().unwrap_or(DEFAULT_TEMPERATURE)
}

/// Parse free-text max-tokens input with the same fallback policy.
pub fn coerce_max_tokens(input: &str) -> u32 {
    input.trim().parse().unwrap_or(DEFAULT_MAX_TOKENS)
}

/// Startup preferences persisted in config.toml. Everything is optional;
/// a missing file behaves exactly like an empty one.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    pub default_provider: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub save_directory: Option<PathBuf>,
    pub save_format: Option<String>,
    #[serde(default)]
    pub default_models: HashMap<String, String>,
}

impl Config {
    pub fn get_default_model(&self, provider: &str) -> Option<&String> {
        let normalized = provider.to_lowercase();
        self.default_models
            .get(&normalized)
            .or_else(|| self.default_models.get(provider))
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        let normalized = provider.to_lowercase();
        self.default_models.insert(normalized.clone(), model);
        if normalized != provider {
            self.default_models.remove(&provider);
        }
    }

    pub fn unset_default_model(&mut self, provider: &str) {
        let normalized = provider.to_lowercase();
        self.default_models.remove(&normalized);
        if normalized != provider {
            self.default_models.remove(provider);
        }
    }

    /// Build the initial session config from these preferences plus
    /// command-line overrides. The model is reconciled against the
    /// provider's registry entry.
    pub fn session_config(
        &self,
        provider_override: Option<&str>,
        model_override: Option<&str>,
    ) -> Result<SessionConfig, ProviderResolutionError> {
        let provider_id = provider_override
            .or(self.default_provider.as_deref())
            .unwrap_or(DEFAULT_PROVIDER);

        let provider = find_builtin_provider(provider_id)
            .ok_or_else(|| ProviderResolutionError::unknown_provider(provider_id))?;

        let requested = model_override
            .map(str::to_string)
            .or_else(|| self.get_default_model(&provider.id).cloned());
        let model = match requested {
            Some(m) if provider.supports_model(&m) => m,
            _ => provider.default_model().to_string(),
        };

        Ok(SessionConfig {
            provider: provider.id.clone(),
            model,
            api_key: None,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system_prompt: self.system_prompt.clone(),
            save_directory: self.save_directory.clone(),
            save_format: self
                .save_format
                .as_deref()
                .map(SaveFormat::from_str)
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_format_parsing_is_total() {
        assert_eq!(SaveFormat::from_str("markdown"), SaveFormat::Markdown);
        assert_eq!(SaveFormat::from_str("md"), SaveFormat::Markdown);
        assert_eq!(SaveFormat::from_str("Markdown"), SaveFormat::Markdown);
        assert_eq!(SaveFormat::from_str("json"), SaveFormat::Json);
        assert_eq!(SaveFormat::from_str(""), SaveFormat::Json);
        assert_eq!(SaveFormat::from_str("yaml"), SaveFormat::Json);
    }

    #[test]
    fn save_format_extensions_match_encoding() {
        assert_eq!(SaveFormat::Json.extension(), "json");
        assert_eq!(SaveFormat::Markdown.extension(), "md");
    }

    #[test]
    fn merged_overrides_only_patched_fields() {
        let config = SessionConfig::default();
        let patch = ConfigPatch {
            temperature: Some(0.2),
            ..Default::default()
        };

        let next = config.merged(&patch);
        assert_eq!(next.temperature, 0.2);
        assert_eq!(next.provider, config.provider);
        assert_eq!(next.model, config.model);
        assert_eq!(next.save_format, config.save_format);
    }

    #[test]
    fn merged_is_idempotent() {
        let config = SessionConfig::default();
        let patch = ConfigPatch {
            model: Some("gpt-4o-mini".to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        let once = config.merged(&patch);
        let twice = once.merged(&patch);
        assert_eq!(once, twice);
    }

    #[test]
    fn merged_can_clear_the_system_prompt() {
        let config = SessionConfig {
            system_prompt: Some("be brief".to_string()),
            ..Default::default()
        };
        let patch = ConfigPatch {
            system_prompt: Some(None),
            ..Default::default()
        };

        assert_eq!(config.merged(&patch).system_prompt, None);
    }

    #[test]
    fn merged_shares_no_structure_with_the_source() {
        let config = SessionConfig::default();
        let mut next = config.merged(&ConfigPatch::default());
        next.model.push_str("-mutated");
        next.provider.clear();
        assert_eq!(config.provider, DEFAULT_PROVIDER);
        assert_ne!(config.model, next.model);
    }

    #[test]
    fn rebind_tracks_binding_fields_only() {
        let base = SessionConfig::default();

        let mut changed = base.clone();
        changed.temperature = 0.1;
        assert!(changed.rebind_required(&base));

        let mut changed = base.clone();
        changed.model = "gpt-4o-mini".to_string();
        assert!(changed.rebind_required(&base));

        let mut changed = base.clone();
        changed.system_prompt = Some("be brief".to_string());
        changed.save_format = SaveFormat::Markdown;
        changed.save_directory = Some(PathBuf::from("/tmp/chats"));
        assert!(!changed.rebind_required(&base));
    }

    #[test]
    fn invalid_numeric_input_coerces_to_defaults() {
        assert_eq!(coerce_temperature("abc"), DEFAULT_TEMPERATURE);
        assert_eq!(coerce_temperature(""), DEFAULT_TEMPERATURE);
        assert_eq!(coerce_temperature("1.2"), 1.2);
        assert_eq!(coerce_max_tokens("many"), DEFAULT_MAX_TOKENS);
        assert_eq!(coerce_max_tokens("-5"), DEFAULT_MAX_TOKENS);
        assert_eq!(coerce_max_tokens("2048"), 2048);
    }

    #[test]
    fn session_config_uses_registry_default_model() {
        let config = Config::default();
        let session = config.session_config(Some("anthropic"), None).unwrap();
        assert_eq!(session.provider, "anthropic");
        assert_eq!(
            session.model,
            find_builtin_provider("anthropic").unwrap().default_model()
        );
    }

    #[test]
    fn session_config_honors_per_provider_default_models() {
        let mut config = Config::default();
        config.set_default_model("openai".to_string(), "gpt-4o-mini".to_string());

        let session = config.session_config(None, None).unwrap();
        assert_eq!(session.model, "gpt-4o-mini");
    }

    #[test]
    fn session_config_replaces_unlisted_model_overrides() {
        let config = Config::default();
        let session = config
            .session_config(Some("openai"), Some("not-a-model"))
            .unwrap();
        assert_eq!(
            session.model,
            find_builtin_provider("openai").unwrap().default_model()
        );
    }

    #[test]
    fn session_config_rejects_unknown_providers() {
        let config = Config::default();
        assert!(config.session_config(Some("nonexistent"), None).is_err());
    }

    #[test]
    fn default_model_lookup_normalizes_provider_case() {
        let mut config = Config::default();
        config.set_default_model("OpenAI".to_string(), "gpt-4o-mini".to_string());
        assert_eq!(
            config.get_default_model("openai"),
            Some(&"gpt-4o-mini".to_string())
        );

        config.unset_default_model("OPENAI");
        assert_eq!(config.get_default_model("openai"), None);
    }
}
