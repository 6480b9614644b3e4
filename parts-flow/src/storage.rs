use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    engine::FlowSession,
    error::{FlowError, Result},
};

const MAX_SESSION_KEY_LEN: usize = 128;

/// Identifier of one conversation.
///
/// Client supplied ids are accepted when they are short and made of
/// `[A-Za-z0-9_-]`, so they can be logged and used in paths as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_KEY_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(FlowError::InvalidSessionKey(raw.chars().take(32).collect()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionKey {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = FlowError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0
    }
}

/// Trait for storing and retrieving the active flow of each conversation
#[async_trait]
pub trait FlowSessionStorage: Send + Sync {
    async fn save(&self, key: &SessionKey, session: FlowSession) -> Result<()>;
    async fn get(&self, key: &SessionKey) -> Result<Option<FlowSession>>;
    /// Returns whether a session was removed
    async fn delete(&self, key: &SessionKey) -> Result<bool>;
}

/// In-memory implementation of FlowSessionStorage
#[derive(Clone, Default)]
pub struct InMemoryFlowSessionStorage {
    sessions: Arc<DashMap<SessionKey, FlowSession>>,
}

impl InMemoryFlowSessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl FlowSessionStorage for InMemoryFlowSessionStorage {
    async fn save(&self, key: &SessionKey, session: FlowSession) -> Result<()> {
        self.sessions.insert(key.clone(), session);
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<FlowSession>> {
        Ok(self.sessions.get(key).map(|entry| entry.clone()))
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool> {
        Ok(self.sessions.remove(key).is_some())
    }
}
