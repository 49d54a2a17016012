//! Response memoization keyed by agent and transcript.
//!
//! A [`ResponseCache`] maps `(agent name, serialized transcript)` to the
//! [`Completion`] that transcript produced. Identical transcripts always
//! replay the stored answer instead of calling the client again, and entries
//! are never invalidated: a new message changes the key.
//!
//! Each key owns its own [`OnceCell`] slot, so concurrent lookups of the same
//! key wait for a single in-flight client call. A failed call leaves its slot
//! empty and the next lookup retries.

use crate::client_wrapper::{Completion, CompletionError, Message};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Identity of one memoized call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    agent: String,
    transcript: String,
}

impl CacheKey {
    pub fn new(agent: &str, transcript: &[Message]) -> Self {
        // Message only holds strings and a unit enum; serialization cannot fail
        let transcript =
            serde_json::to_string(transcript).unwrap_or_else(|_| format!("{:?}", transcript));
        Self {
            agent: agent.to_string(),
            transcript,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }
}

/// Whether a lookup was answered from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    slots: Mutex<HashMap<CacheKey, Arc<OnceCell<Completion>>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored completion for `key`, if a call for it ever succeeded.
    pub async fn get(&self, key: &CacheKey) -> Option<Completion> {
        let slots = self.slots.lock().await;
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).await.is_some()
    }

    /// Number of stored completions.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return the completion stored under `key`, or run `call` and store its
    /// result if it succeeds.
    ///
    /// `call` runs at most once at a time per key. Errors are returned to the
    /// caller and nothing is stored.
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        key: CacheKey,
        call: F,
    ) -> Result<(Completion, CacheStatus), CompletionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Completion, CompletionError>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            // a lookup dropped mid-call leaves an empty slot only the map holds
            slots.retain(|_, slot| slot.initialized() || Arc::strong_count(slot) > 1);
            Arc::clone(
                slots
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let mut invoked = false;
        let result = slot
            .get_or_try_init(|| {
                invoked = true;
                call()
            })
            .await
            .map(|completion| completion.clone());

        match result {
            Ok(completion) => {
                let status = if invoked {
                    CacheStatus::Miss
                } else {
                    CacheStatus::Hit
                };
                Ok((completion, status))
            }
            Err(err) => {
                self.evict_empty(&key, &slot).await;
                Err(err)
            }
        }
    }

    /// Drop an empty slot nobody else is waiting on.
    async fn evict_empty(&self, key: &CacheKey, slot: &Arc<OnceCell<Completion>>) {
        let mut slots = self.slots.lock().await;
        let idle = slots.get(key).map_or(false, |current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(slot) <= 2
        });
        if idle {
            slots.remove(key);
        }
    }
}
