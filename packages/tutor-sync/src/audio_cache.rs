//! Generated speech cache.
//!
//! Lookups go process memory, then the local database, then the shared
//! remote collection. Generation only happens when all three miss. The shared
//! collection is keyed by a hash of the normalized text so every user hits
//! the same entry.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::ai::AiError;
use crate::coordinator::{
    record_failure, EntityFamily, RemoteFailure, RemoteOutcome, SyncCoordinator, SyncError, SyncResult,
};
use crate::models::AudioCacheEntry;
use crate::remote::{to_document, Document, RemotePath, SetOptions, AUDIO_CACHE};

/// Collapses runs of whitespace and trims the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Document id of `normalized` in the shared collection.
pub fn shared_audio_id(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[derive(Debug, Default)]
pub struct AudioMemo {
    entries: Mutex<HashMap<String, String>>,
}

impl AudioMemo {
    pub fn get(&self, text: &str) -> Option<String> {
        self.entries.lock().get(text).cloned()
    }

    pub fn insert(&self, text: String, audio: String) {
        self.entries.lock().insert(text, audio);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SyncCoordinator {
    /// Cached base64 audio for `text`, if any layer has it. Never fails:
    /// a broken layer is logged and skipped.
    pub async fn get_cached_audio(&self, text: &str) -> Option<String> {
        let key = normalize_text(text);
        if key.is_empty() {
            return None;
        }

        if let Some(audio) = self.audio_memo.get(&key) {
            return Some(audio);
        }

        match self.local.get::<AudioCacheEntry>(&key) {
            Ok(Some(entry)) => {
                self.audio_memo.insert(key, entry.audio.clone());
                return Some(entry.audio);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "local audio cache read failed"),
        }

        let doc = RemotePath::collection(AUDIO_CACHE).doc(shared_audio_id(&key));
        let outcome = self
            .attempt_remote(EntityFamily::AudioCache, |target| {
                let doc = &doc;
                async move {
                    match target.store.get(doc).await? {
                        Some(data) => {
                            let found = Document { path: doc.clone(), data };
                            Ok(Some(found.decode::<AudioCacheEntry>()?))
                        }
                        None => Ok(None),
                    }
                }
            })
            .await;

        let RemoteOutcome::Done(Some(entry)) = outcome else {
            return None;
        };

        let entry = AudioCacheEntry { text: key.clone(), ..entry };
        if let Err(err) = self.local.put(&entry) {
            tracing::warn!(error = %err, "could not keep shared audio locally");
        }
        self.audio_memo.insert(key, entry.audio.clone());
        Some(entry.audio)
    }

    /// Stores audio locally and in memory, then publishes it to the shared
    /// collection in the background. Nothing is published if the local write
    /// fails.
    pub async fn save_cached_audio(&self, text: &str, audio: &str) -> SyncResult<()> {
        let key = normalize_text(text);
        if key.is_empty() {
            return Err(SyncError::Invalid("cannot cache audio for empty text".to_string()));
        }

        let entry = AudioCacheEntry {
            text: key.clone(),
            audio: audio.to_string(),
            timestamp: self.clock.now_ms(),
        };

        self.local.put(&entry)?;
        self.audio_memo.insert(key, entry.audio.clone());
        self.publish_shared_audio(&entry);
        Ok(())
    }

    /// Base64 audio for `text`, generating and caching it on a miss.
    pub async fn speak(&self, text: &str) -> SyncResult<String> {
        if normalize_text(text).is_empty() {
            return Err(SyncError::Invalid("nothing to speak".to_string()));
        }
        if let Some(audio) = self.get_cached_audio(text).await {
            return Ok(audio);
        }

        let speech = self.speech.as_ref().ok_or(AiError::Unavailable)?;
        let pcm = speech.synthesize(text).await?;
        let audio = STANDARD.encode(pcm);

        if let Err(err) = self.save_cached_audio(text, &audio).await {
            tracing::warn!(error = %err, "generated audio could not be cached");
        }
        Ok(audio)
    }

    fn publish_shared_audio(&self, entry: &AudioCacheEntry) {
        let target = match self.remote_target() {
            Ok(target) => target,
            Err(reason) => {
                tracing::trace!(?reason, "shared audio publish skipped");
                return;
            }
        };
        let body = match to_document(entry) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(error = %err, "could not encode audio entry");
                return;
            }
        };

        let doc = RemotePath::collection(AUDIO_CACHE).doc(shared_audio_id(&entry.text));
        let store = target.store;
        let breaker = self.breaker.clone();
        let clock = Arc::clone(&self.clock);
        let timeout = self.remote_timeout;

        tokio::spawn(async move {
            let failure = match tokio::time::timeout(timeout, store.set(&doc, body, SetOptions::REPLACE)).await {
                Ok(Ok(())) => return,
                Ok(Err(err)) => RemoteFailure::classify(err),
                Err(_) => RemoteFailure::Timeout(timeout),
            };

            record_failure(&breaker, clock.now_ms(), EntityFamily::AudioCache, &failure);
        });
    }
}
