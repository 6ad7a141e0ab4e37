use crate::config::PRONUNCIATION_HISTORY_LIMIT;
use crate::coordinator::{
    decode_all, EntityFamily, MirrorPolicy, ReadPolicy, SyncCoordinator, SyncError, SyncResult, PRONUNCIATION,
};
use crate::local::{Index, IndexRange, Order};
use crate::models::{PronunciationAttempt, MAX_PRONUNCIATION_SCORE};
use crate::remote::{to_document, Direction, Query, SetOptions};

impl SyncCoordinator {
    pub async fn save_pronunciation_attempt(&self, attempt: &PronunciationAttempt) -> SyncResult<()> {
        if attempt.score > MAX_PRONUNCIATION_SCORE {
            return Err(SyncError::Invalid(format!(
                "pronunciation score {} is above {MAX_PRONUNCIATION_SCORE}",
                attempt.score
            )));
        }

        self.write_with_fallback(
            EntityFamily::Pronunciation,
            MirrorPolicy::Always,
            |target| async move {
                let doc = target.user_collection(PRONUNCIATION).doc(attempt.key());
                target.store.set(&doc, to_document(attempt)?, SetOptions::REPLACE).await
            },
            |local| local.put(attempt),
        )
        .await
    }

    /// Latest attempts for `word`, newest first. An empty remote answer is
    /// checked against the local copy.
    pub async fn get_pronunciation_history(&self, word: &str) -> SyncResult<Vec<PronunciationAttempt>> {
        self.read_with_fallback(
            EntityFamily::Pronunciation,
            ReadPolicy::LocalIfEmpty(Vec::is_empty),
            |target| async move {
                let query = Query::new()
                    .where_eq("word", word)
                    .order_by("timestamp", Direction::Desc)
                    .limit(PRONUNCIATION_HISTORY_LIMIT);
                let docs = target.store.query(&target.user_collection(PRONUNCIATION), &query).await?;
                Ok(decode_all(&docs))
            },
            |local| {
                local.query_by_index(
                    Index::ByWord,
                    IndexRange::Eq(word.into()),
                    Order::Desc,
                    Some(PRONUNCIATION_HISTORY_LIMIT),
                )
            },
        )
        .await
    }
}
