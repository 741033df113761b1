//! Table of outstanding bridge commands awaiting a native reply

use crate::error::{Result, XrError};
use crate::shared::lock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::debug;

/// `<action>-<unix ms>-<random>`
pub fn generate_callback_key(action: &str) -> String {
    format!(
        "{}-{}-{}",
        action,
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

struct PendingEntry {
    action: &'static str,
    resolver: oneshot::Sender<Value>,
}

/// Each key is resolved at most once and is gone from the table afterwards
#[derive(Default)]
pub struct PendingCalls {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under a fresh key before the command is sent
    pub fn register(&self, action: &'static str) -> PendingReply {
        let (resolver, receiver) = oneshot::channel();
        let mut entries = lock(&self.entries);
        let mut key = generate_callback_key(action);
        while entries.contains_key(&key) {
            key = generate_callback_key(action);
        }
        entries.insert(key.clone(), PendingEntry { action, resolver });

        PendingReply {
            key,
            action,
            receiver,
        }
    }

    /// Deliver a reply. Unknown or already-resolved keys are ignored.
    pub fn resolve(&self, key: &str, data: Value) -> bool {
        let Some(entry) = lock(&self.entries).remove(key) else {
            debug!("Ignoring reply for unknown callback key {}", key);
            return false;
        };
        if entry.resolver.send(data).is_err() {
            debug!("Reply for {} arrived after its caller went away", entry.action);
        }
        true
    }

    /// Forget a key whose command never reached the host
    pub fn discard(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Drop every outstanding resolver; waiting callers see `CallbackDropped`
    pub fn cancel_all(&self) -> usize {
        let mut entries = lock(&self.entries);
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

/// Completion handle for one registered command
#[derive(Debug)]
pub struct PendingReply {
    key: String,
    action: &'static str,
    receiver: oneshot::Receiver<Value>,
}

impl PendingReply {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    pub async fn wait(self) -> Result<Value> {
        let action = self.action;
        self.receiver.await.map_err(|_| XrError::CallbackDropped {
            action: action.to_string(),
        })
    }

    /// Await and decode the reply payload
    pub async fn wait_json<T: DeserializeOwned>(self) -> Result<T> {
        let action = self.action;
        let value = self.wait().await?;
        serde_json::from_value(value).map_err(|source| XrError::MalformedResponse {
            action: action.to_string(),
            source,
        })
    }

    /// Non-blocking poll, used from the frame loop
    pub fn try_take(&mut self) -> Option<Result<Value>> {
        match self.receiver.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(XrError::CallbackDropped {
                action: self.action.to_string(),
            })),
        }
    }
}
