//! Session service: the single owner of the live config and the bound
//! provider client.
//!
//! The service is stateless with respect to conversation history. The
//! shell owns the conversation and passes it in on every call; the core
//! never appends, reorders, or deletes messages.

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::client::{CompletionApi, ProviderClient, ProviderError};
use crate::core::config::{ConfigPatch, SessionConfig};
use crate::core::message::Message;
use crate::core::providers::reconcile_model;
use crate::transcript::{save_transcript, SaveError};

pub struct Session {
    config: SessionConfig,
    client: Arc<dyn CompletionApi>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ProviderError> {
        let client: Arc<dyn CompletionApi> = Arc::new(ProviderClient::bind(&config)?);
        Ok(Self { config, client })
    }

    #[cfg(test)]
    pub(crate) fn with_client(config: SessionConfig, client: Arc<dyn CompletionApi>) -> Self {
        Self { config, client }
    }

    /// Cloned snapshot of the live config. The snapshot shares no mutable
    /// structure with the session; callers can do what they like with it.
    pub fn config(&self) -> SessionConfig {
        self.config.clone()
    }

    /// Merge a patch over the current config and adopt the result.
    ///
    /// The model is reconciled against the provider's registry entry, so a
    /// provider switch that strands the current model lands on the new
    /// provider's first listed model instead. The client is rebuilt only
    /// when a binding-relevant field changed. On any failure the previous
    /// config and client stay in place.
    pub fn update(&mut self, patch: &ConfigPatch) -> Result<(), ProviderError> {
        let mut next = self.config.merged(patch);
        next.model = reconcile_model(&next.provider, &next.model)
            .map_err(|e| ProviderError::new(next.provider.clone(), e.to_string()))?;

        if next.rebind_required(&self.config) {
            self.client = Arc::new(ProviderClient::bind(&next)?);
        }
        self.config = next;
        Ok(())
    }

    /// Request one completion for the given conversation.
    ///
    /// The client handle and system prompt are captured before the await,
    /// so an `update` issued while this call is in flight affects only the
    /// next call; this one completes against the binding it started with.
    /// No retries; a failed send changes nothing.
    pub async fn send(&self, conversation: &[Message]) -> Result<String, ProviderError> {
        let client = Arc::clone(&self.client);
        let system_prompt = self.config.system_prompt.clone();
        client
            .complete(conversation, system_prompt.as_deref())
            .await
    }

    /// Persist the conversation under the current config's save settings.
    pub fn save(
        &self,
        conversation: &[Message],
        title: Option<&str>,
    ) -> Result<PathBuf, SaveError> {
        save_transcript(conversation, &self.config, title)
    }

    #[cfg(test)]
    pub(crate) fn client_handle(&self) -> Arc<dyn CompletionApi> {
        Arc::clone(&self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SaveFormat;
    use crate::core::providers::find_builtin_provider;
    use crate::utils::test_utils::{test_session_config, EnvVarGuard};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockClient {
        calls: Mutex<Vec<(Vec<Message>, Option<String>)>>,
        reply: Result<String, String>,
    }

    impl MockClient {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply: Ok(reply.to_string()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply: Err(message.to_string()),
            })
        }

        fn calls(&self) -> Vec<(Vec<Message>, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionApi for MockClient {
        async fn complete(
            &self,
            conversation: &[Message],
            system_prompt: Option<&str>,
        ) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((conversation.to_vec(), system_prompt.map(str::to_string)));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(ProviderError::new("Mock", message.clone())),
            }
        }
    }

    #[tokio::test]
    async fn send_passes_conversation_and_prompt_without_mutation() {
        let mut config = test_session_config();
        config.system_prompt = Some("be brief".to_string());
        let mock = MockClient::replying("hello");
        let session = Session::with_client(config, mock.clone());

        let conversation = vec![Message::user("hi")];
        let reply = session.send(&conversation).await.unwrap();

        assert_eq!(reply, "hello");
        assert_eq!(conversation, vec![Message::user("hi")]);

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, conversation);
        assert_eq!(calls[0].1.as_deref(), Some("be brief"));
    }

    #[tokio::test]
    async fn send_failures_propagate_and_change_nothing() {
        let config = test_session_config();
        let mock = MockClient::failing("boom");
        let session = Session::with_client(config.clone(), mock);

        let err = session.send(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(session.config(), config);
    }

    #[test]
    fn config_snapshots_are_independent() {
        let session = Session::new(test_session_config()).unwrap();

        let mut snapshot = session.config();
        snapshot.model.push_str("-mutated");
        snapshot.provider.clear();

        assert_eq!(session.config(), test_session_config());
    }

    #[test]
    fn provider_switch_reconciles_a_stranded_model() {
        let mut session = Session::new(test_session_config()).unwrap();

        let patch = ConfigPatch {
            provider: Some("anthropic".to_string()),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        session.update(&patch).unwrap();

        let anthropic = find_builtin_provider("anthropic").unwrap();
        let config = session.config();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.model, anthropic.default_model());
        assert!(anthropic.supports_model(&config.model));
    }

    #[test]
    fn repeated_identical_updates_are_idempotent() {
        let mut session = Session::new(test_session_config()).unwrap();
        let patch = ConfigPatch {
            model: Some("gpt-4o-mini".to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        session.update(&patch).unwrap();
        let after_first = session.config();
        session.update(&patch).unwrap();
        assert_eq!(session.config(), after_first);
    }

    #[test]
    fn rebind_happens_only_for_binding_fields() {
        let mut session = Session::new(test_session_config()).unwrap();
        let before = session.client_handle();

        let patch = ConfigPatch {
            save_format: Some(SaveFormat::Markdown),
            system_prompt: Some(Some("be brief".to_string())),
            ..Default::default()
        };
        session.update(&patch).unwrap();
        assert!(Arc::ptr_eq(&before, &session.client_handle()));
        assert_eq!(session.config().save_format, SaveFormat::Markdown);

        let patch = ConfigPatch {
            temperature: Some(0.2),
            ..Default::default()
        };
        session.update(&patch).unwrap();
        assert!(!Arc::ptr_eq(&before, &session.client_handle()));
    }

    #[test]
    fn unknown_provider_update_leaves_everything_in_place() {
        let mut session = Session::new(test_session_config()).unwrap();
        let before_config = session.config();
        let before_client = session.client_handle();

        let patch = ConfigPatch {
            provider: Some("nonexistent".to_string()),
            ..Default::default()
        };
        let err = session.update(&patch).unwrap_err();

        assert!(err.to_string().contains("nonexistent"));
        assert_eq!(session.config(), before_config);
        assert!(Arc::ptr_eq(&before_client, &session.client_handle()));
    }

    #[test]
    fn failed_rebind_rolls_back_nothing() {
        let mut session = Session::new(test_session_config()).unwrap();
        let before_config = session.config();

        let mut guard = EnvVarGuard::new();
        guard.remove_var("ANTHROPIC_API_KEY");

        // Empty explicit key forces the env fallback, which is absent.
        let patch = ConfigPatch {
            provider: Some("anthropic".to_string()),
            api_key: Some(String::new()),
            ..Default::default()
        };
        let err = session.update(&patch).unwrap_err();

        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert_eq!(session.config(), before_config);
    }
}
