//! Shared test fixtures.
//!
//! Tests that touch process environment variables must go through
//! [`EnvVarGuard`]: it serializes them against each other and restores
//! the previous values on drop, so the parallel test harness never
//! observes a half-mutated environment.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::core::config::SessionConfig;
use crate::core::message::Message;

static ENV_LOCK: Mutex<()> = Mutex::new(());

pub struct EnvVarGuard {
    _lock: MutexGuard<'static, ()>,
    saved: HashMap<String, Option<String>>,
}

impl EnvVarGuard {
    pub fn new() -> Self {
        let lock = ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            _lock: lock,
            saved: HashMap::new(),
        }
    }

    pub fn set_var(&mut self, key: &str, value: &str) {
        self.remember(key);
        std::env::set_var(key, value);
    }

    pub fn remove_var(&mut self, key: &str) {
        self.remember(key);
        std::env::remove_var(key);
    }

    fn remember(&mut self, key: &str) {
        self.saved
            .entry(key.to_string())
            .or_insert_with(|| std::env::var(key).ok());
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain() {
            match value {
                Some(previous) => std::env::set_var(&key, previous),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Session config with an explicit credential, so binding never depends
/// on the test host's environment.
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    }
}

pub fn sample_conversation() -> Vec<Message> {
    vec![
        Message::user("Hello"),
        Message::assistant("Hi there!"),
        Message::user("How are you?"),
        Message::assistant("I'm doing well, thank you for asking!"),
    ]
}
