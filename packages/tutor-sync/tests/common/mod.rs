#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

use tutor_sync::auth::{AuthHandle, UserId};
use tutor_sync::clock::ManualClock;
use tutor_sync::config::RemoteConfig;
use tutor_sync::local::LocalStore;
use tutor_sync::models::VocabCard;
use tutor_sync::remote::MemoryRemoteStore;
use tutor_sync::SyncCoordinator;

pub const USER: &str = "learner-1";

pub struct Harness {
    pub coordinator: SyncCoordinator,
    pub remote: Arc<MemoryRemoteStore>,
    pub auth: Arc<AuthHandle>,
    pub clock: Arc<ManualClock>,
}

pub fn local_time(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("unambiguous local time")
}

/// Signed-in user, reachable in-memory remote, 2 s timeout, clock at
/// 2026-05-12 10:00 local.
pub fn harness() -> Harness {
    harness_with_store(LocalStore::in_memory().expect("in-memory store"))
}

pub fn harness_with_store(local: LocalStore) -> Harness {
    let remote = Arc::new(MemoryRemoteStore::new());
    let auth = Arc::new(AuthHandle::signed_in(UserId::new(USER), None));
    let clock = Arc::new(ManualClock::new(local_time(2026, 5, 12, 10, 0)));

    let coordinator = SyncCoordinator::new(local, auth.clone(), &RemoteConfig::default())
        .with_remote(remote.clone())
        .with_clock(clock.clone())
        .with_timeout(Duration::from_millis(2000));

    Harness {
        coordinator,
        remote,
        auth,
        clock,
    }
}

pub fn card(character: &str) -> VocabCard {
    VocabCard {
        character: character.to_string(),
        pinyin: "nǐ hǎo".to_string(),
        translation: "hello".to_string(),
        example_sentence: "你好，我叫小明。".to_string(),
        example_pinyin: Some("nǐ hǎo, wǒ jiào xiǎo míng.".to_string()),
        example_translation: "Hello, my name is Xiao Ming.".to_string(),
        bookmarked: false,
    }
}
