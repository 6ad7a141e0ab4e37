mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use common::{harness, harness_with_store, Harness};
use tutor_sync::ai::{AiError, SpeechSynthesizer};
use tutor_sync::audio_cache::{normalize_text, shared_audio_id};
use tutor_sync::auth::{AuthHandle, UserId};
use tutor_sync::config::RemoteConfig;
use tutor_sync::local::{LocalStore, LocalStoreError};
use tutor_sync::models::{AudioCacheEntry, ChatMessage, ChatRole};
use tutor_sync::remote::{RemoteError, RemotePath, AUDIO_CACHE};
use tutor_sync::{RemoteFailure, SyncCoordinator, SyncError};

// ============================================================
// Chat
// ============================================================

fn message(id: &str, role: ChatRole, timestamp: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        role,
        text: format!("message {id}"),
        image: None,
        audio: None,
        grounding_urls: None,
        timestamp,
    }
}

#[tokio::test]
async fn chat_history_is_oldest_first_and_bounded() {
    let h = harness();
    for i in 0..55 {
        let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Model };
        h.coordinator
            .save_chat_message(&message(&format!("m{i:02}"), role, 1_000 + i))
            .await
            .unwrap();
    }

    let history = h.coordinator.get_chat_history().await;
    assert_eq!(history.len(), 50);
    assert_eq!(history.first().unwrap().id, "m05");
    assert_eq!(history.last().unwrap().id, "m54");
    assert!(history.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
}

#[tokio::test]
async fn chat_audio_update_and_clear() {
    let h = harness();
    h.coordinator
        .save_chat_message(&message("a", ChatRole::Model, 10))
        .await
        .unwrap();
    h.coordinator.update_message_audio("a", "UENN").await.unwrap();

    let history = h.coordinator.get_chat_history().await;
    assert_eq!(history[0].audio.as_deref(), Some("UENN"));
    assert_eq!(history[0].text, "message a");

    h.coordinator.clear_chat_history().await.unwrap();
    assert!(h.coordinator.get_chat_history().await.is_empty());
    assert_eq!(h.remote.calls().batch_delete, 1);
}

#[tokio::test]
async fn chat_without_remote_is_silent() {
    let h = harness();
    h.auth.sign_out();

    h.coordinator
        .save_chat_message(&message("x", ChatRole::User, 1))
        .await
        .unwrap();
    h.coordinator.clear_chat_history().await.unwrap();
    assert!(h.coordinator.get_chat_history().await.is_empty());
    assert_eq!(h.remote.calls().total(), 0);
}

#[tokio::test]
async fn chat_remote_failure_is_reported() {
    let h = harness();
    h.remote.fail_with(RemoteError::unavailable("offline"));

    let saved = h.coordinator.save_chat_message(&message("x", ChatRole::User, 1)).await;
    assert!(matches!(saved, Err(SyncError::Remote(RemoteFailure::Transient(_)))));
    assert!(h.coordinator.get_chat_history().await.is_empty());
}

// ============================================================
// Audio cache
// ============================================================

#[derive(Default)]
struct CountingSynth {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for CountingSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(text.as_bytes().to_vec())
    }
}

fn with_speech(h: Harness, synth: Arc<CountingSynth>) -> Harness {
    Harness {
        coordinator: h.coordinator.with_speech(synth),
        ..h
    }
}

async fn wait_for_shared(h: &Harness, text: &str) -> bool {
    let doc = RemotePath::collection(AUDIO_CACHE).doc(shared_audio_id(&normalize_text(text)));
    for _ in 0..50 {
        if h.remote.document(&doc).is_some() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    false
}

#[tokio::test]
async fn speak_generates_once_then_serves_from_cache() {
    let synth = Arc::new(CountingSynth::default());
    let h = with_speech(harness(), synth.clone());

    let first = h.coordinator.speak("你好  世界").await.unwrap();
    let second = h.coordinator.speak(" 你好 世界 ").await.unwrap();

    assert_eq!(first, STANDARD.encode("你好  世界".as_bytes()));
    assert_eq!(first, second);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);

    let stored: AudioCacheEntry = h.coordinator.local().get("你好 世界").unwrap().unwrap();
    assert_eq!(stored.audio, first);
    assert!(wait_for_shared(&h, "你好 世界").await);
}

#[tokio::test]
async fn shared_entries_are_reused_by_other_users() {
    let synth = Arc::new(CountingSynth::default());
    let h = with_speech(harness(), synth.clone());
    h.coordinator.speak("谢谢").await.unwrap();
    assert!(wait_for_shared(&h, "谢谢").await);

    let other_auth = Arc::new(AuthHandle::signed_in(UserId::new("learner-2"), None));
    let other_synth = Arc::new(CountingSynth::default());
    let other = SyncCoordinator::new(LocalStore::in_memory().unwrap(), other_auth, &RemoteConfig::default())
        .with_remote(h.remote.clone())
        .with_speech(other_synth.clone());

    let audio = other.get_cached_audio("谢谢").await.expect("shared hit");
    assert_eq!(audio, STANDARD.encode("谢谢".as_bytes()));
    assert_eq!(other_synth.calls.load(Ordering::SeqCst), 0);

    // The remote hit is kept locally for next time.
    let kept: AudioCacheEntry = other.local().get("谢谢").unwrap().unwrap();
    assert_eq!(kept.audio, audio);
}

#[tokio::test]
async fn background_publish_failure_trips_breaker_without_failing_save() {
    let h = harness();
    h.remote.fail_with(RemoteError::permission_denied("audio_cache is read-only"));

    h.coordinator.save_cached_audio("再见", "QUJD").await.unwrap();
    for _ in 0..50 {
        if h.coordinator.is_remote_disabled() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(h.coordinator.is_remote_disabled());
    assert_eq!(h.coordinator.get_cached_audio("再见").await.as_deref(), Some("QUJD"));
    assert_eq!(h.remote.calls().set, 1);
}

#[tokio::test]
async fn failed_local_audio_write_is_never_published() {
    let local = LocalStore::in_memory().unwrap();
    local.limit_pages(1).unwrap();
    let h = harness_with_store(local);
    let audio = "A".repeat(256 * 1024);

    let err = h.coordinator.save_cached_audio("满了", &audio).await.unwrap_err();
    assert!(matches!(err, SyncError::Local(LocalStoreError::QuotaExceeded)), "got {err:?}");

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.remote.calls().set, 0);
    assert!(!wait_for_shared(&h, "满了").await);
}

#[tokio::test]
async fn speak_without_synthesizer_or_text_fails() {
    let h = harness();
    assert!(matches!(
        h.coordinator.speak("没有").await,
        Err(SyncError::Generation(AiError::Unavailable))
    ));
    assert!(matches!(h.coordinator.speak("   ").await, Err(SyncError::Invalid(_))));
    assert!(h.coordinator.get_cached_audio("没有").await.is_none());
}
