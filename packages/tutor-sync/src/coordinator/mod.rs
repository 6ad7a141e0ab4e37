//! Remote-first persistence with local fallback.
//!
//! Every public operation here tries the cloud store under a deadline and
//! degrades to the on-device store when the remote is absent, slow, failing,
//! or has denied access for this session. Callers never see a remote failure
//! on data paths; only chat (which has no local copy) reports one.

mod breaker;
mod chat;
mod fallback;
mod progress;
mod pronunciation;
mod results;
mod vocabulary;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::ai::{AiError, SpeechSynthesizer};
use crate::audio_cache::AudioMemo;
use crate::auth::AuthProvider;
use crate::clock::{Clock, SystemClock};
use crate::config::RemoteConfig;
use crate::local::{LocalStore, LocalStoreError};
use crate::remote::RemoteStore;

pub use breaker::{is_permission_error, CircuitBreaker, RemoteFailure, RemoteStatus};

pub(crate) use fallback::{decode_all, record_failure, MirrorPolicy, ReadPolicy, RemoteOutcome};

// Per-user remote collections under `users/{uid}/`.
pub(crate) const RESULTS: &str = "results";
pub(crate) const VOCABULARY: &str = "vocabulary";
pub(crate) const PRONUNCIATION: &str = "pronunciation";
pub(crate) const DAILY_STATS: &str = "daily_stats";
pub(crate) const SETTINGS: &str = "settings";
pub(crate) const GOALS_DOC: &str = "goals";
pub(crate) const CHAT_HISTORY: &str = "chat_history";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),

    #[error(transparent)]
    Remote(#[from] RemoteFailure),

    #[error(transparent)]
    Generation(#[from] AiError),

    #[error("invalid input: {0}")]
    Invalid(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Entity family label used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFamily {
    Results,
    Vocabulary,
    Pronunciation,
    DailyStats,
    Goals,
    AudioCache,
    Chat,
}

impl EntityFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityFamily::Results => "results",
            EntityFamily::Vocabulary => "vocabulary",
            EntityFamily::Pronunciation => "pronunciation",
            EntityFamily::DailyStats => "daily_stats",
            EntityFamily::Goals => "goals",
            EntityFamily::AudioCache => "audio_cache",
            EntityFamily::Chat => "chat",
        }
    }
}

pub struct SyncCoordinator {
    pub(crate) local: LocalStore,
    pub(crate) remote: Option<Arc<dyn RemoteStore>>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) remote_timeout: Duration,
    pub(crate) audio_memo: AudioMemo,
    pub(crate) speech: Option<Arc<dyn SpeechSynthesizer>>,
}

impl SyncCoordinator {
    /// A local-only coordinator; attach a remote with [`Self::with_remote`].
    pub fn new(local: LocalStore, auth: Arc<dyn AuthProvider>, config: &RemoteConfig) -> Self {
        Self {
            local,
            remote: None,
            auth,
            clock: Arc::new(SystemClock),
            breaker: CircuitBreaker::new(),
            remote_timeout: config.timeout,
            audio_memo: AudioMemo::default(),
            speech: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote_timeout(&self) -> Duration {
        self.remote_timeout
    }

    /// Whether the permission breaker has disabled remote access.
    pub fn is_remote_disabled(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.breaker.status()
    }
}
