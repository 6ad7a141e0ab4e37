use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate, TimeZone};

use crate::clock::local_midnight_ms;
use crate::config::VOCAB_STATS_WINDOW_DAYS;
use crate::coordinator::{
    decode_all, EntityFamily, MirrorPolicy, ReadPolicy, SyncCoordinator, SyncError, SyncResult, VOCABULARY,
};
use crate::local::{Index, IndexRange, Order};
use crate::merge::{merge_vocab, VocabPatch};
use crate::models::{HskLevel, Rating, VocabCard, VocabularyRecord, WeekdayCount};
use crate::remote::{to_document, Query, SetOptions};

const IMAGE_DATA_URI_PREFIX: &str = "data:image/";

impl SyncCoordinator {
    /// Records a review rating and stamps the review time.
    pub async fn save_vocab_progress(&self, card: &VocabCard, level: HskLevel, rating: Rating) -> SyncResult<()> {
        let patch = VocabPatch::from_card(card, level).rated(rating, self.clock.now_ms());
        self.apply_vocab_patch(&patch).await
    }

    /// Flips the bookmark flag and returns the new value.
    ///
    /// The flag is read from the stored record when there is one; the card's
    /// own copy is only used for words never saved before.
    pub async fn toggle_vocab_bookmark(&self, card: &VocabCard, level: HskLevel) -> SyncResult<bool> {
        let current = match self.local.get::<VocabularyRecord>(&card.character) {
            Ok(Some(record)) => record.is_bookmarked(),
            Ok(None) => card.bookmarked,
            Err(err) => {
                tracing::warn!(character = %card.character, error = %err, "could not read stored bookmark");
                card.bookmarked
            }
        };
        let bookmarked = !current;

        let patch = VocabPatch::from_card(card, level).bookmark(bookmarked);
        self.apply_vocab_patch(&patch).await?;
        Ok(bookmarked)
    }

    /// Attaches a user-supplied image. The word's level is left as stored.
    pub async fn save_vocab_custom_image(&self, card: &VocabCard, image_data_uri: &str) -> SyncResult<()> {
        if !image_data_uri.starts_with(IMAGE_DATA_URI_PREFIX) {
            return Err(SyncError::Invalid("custom image must be an image data URI".to_string()));
        }

        let mut patch = VocabPatch::from_card(card, HskLevel::default()).custom_image(image_data_uri);
        patch.level = None;
        self.apply_vocab_patch(&patch).await
    }

    pub async fn get_bookmarked_words(&self, level: HskLevel) -> SyncResult<Vec<VocabularyRecord>> {
        self.read_with_fallback(
            EntityFamily::Vocabulary,
            ReadPolicy::TrustRemote,
            |target| async move {
                let query = Query::new()
                    .where_eq("bookmarked", true)
                    .where_eq("level", level.as_str());
                let docs = target.store.query(&target.user_collection(VOCABULARY), &query).await?;
                Ok(decode_all(&docs))
            },
            |local| {
                let records: Vec<VocabularyRecord> =
                    local.query_by_index(Index::ByLevel, IndexRange::Eq(level.as_str().into()), Order::Asc, None)?;
                Ok(records.into_iter().filter(VocabularyRecord::is_bookmarked).collect())
            },
        )
        .await
    }

    /// Words reviewed on each of the last seven local days, oldest first.
    pub async fn get_vocab_stats(&self, level: Option<HskLevel>) -> SyncResult<Vec<WeekdayCount>> {
        let today = self.clock.now().date_naive();
        let first_day = today - Duration::days(VOCAB_STATS_WINDOW_DAYS - 1);
        let since = local_midnight_ms(first_day);

        let reviewed = self
            .read_with_fallback(
                EntityFamily::Vocabulary,
                ReadPolicy::TrustRemote,
                |target| async move {
                    let mut query = Query::new().where_gte("lastReviewed", since);
                    if let Some(level) = level {
                        query = query.where_eq("level", level.as_str());
                    }
                    let docs = target.store.query(&target.user_collection(VOCABULARY), &query).await?;
                    Ok(decode_all::<VocabularyRecord>(&docs))
                },
                |local| {
                    let records: Vec<VocabularyRecord> =
                        local.query_by_index(Index::ByLastReviewed, IndexRange::AtLeast(since.into()), Order::Asc, None)?;
                    Ok(records
                        .into_iter()
                        .filter(|record| level.map_or(true, |level| record.level == level))
                        .collect())
                },
            )
            .await?;

        Ok(weekday_histogram(first_day, &reviewed))
    }

    async fn apply_vocab_patch(&self, patch: &VocabPatch) -> SyncResult<()> {
        self.write_with_fallback(
            EntityFamily::Vocabulary,
            MirrorPolicy::Always,
            |target| async move {
                let doc = target.user_collection(VOCABULARY).doc(patch.character.clone());
                target.store.set(&doc, to_document(patch)?, SetOptions::MERGE).await
            },
            |local| {
                let existing = local.get::<VocabularyRecord>(&patch.character)?;
                local.put(&merge_vocab(existing, patch))
            },
        )
        .await
    }
}

/// Buckets review times into the `VOCAB_STATS_WINDOW_DAYS` days starting at
/// `first_day`. Records outside the window are ignored.
fn weekday_histogram(first_day: NaiveDate, records: &[VocabularyRecord]) -> Vec<WeekdayCount> {
    let mut counts: HashMap<NaiveDate, u32> = HashMap::new();
    for record in records {
        if let Some(at) = Local.timestamp_millis_opt(record.last_reviewed).single() {
            *counts.entry(at.date_naive()).or_default() += 1;
        }
    }

    (0..VOCAB_STATS_WINDOW_DAYS)
        .map(|offset| {
            let day = first_day + Duration::days(offset);
            WeekdayCount {
                day: day.format("%a").to_string(),
                count: counts.get(&day).copied().unwrap_or(0),
            }
        })
        .collect()
}
