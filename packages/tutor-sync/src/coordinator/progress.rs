use serde_json::Value;

use crate::coordinator::{
    decode_all, EntityFamily, MirrorPolicy, ReadPolicy, SyncCoordinator, SyncError, SyncResult, DAILY_STATS,
    GOALS_DOC, PRONUNCIATION, RESULTS, SETTINGS, VOCABULARY,
};
use crate::local::{Index, IndexRange, Order, USER_GOALS_KEY};
use crate::merge::{merge_daily_stat, StudyDelta};
use crate::models::{
    DailyProgress, DailyStat, PronunciationAttempt, ResultRecord, UserGoals, UserStats, VocabularyRecord,
};
use crate::remote::{to_document, Query, RemoteError, RemoteResult, SetOptions};

impl SyncCoordinator {
    pub async fn save_user_goals(&self, goals: &UserGoals) -> SyncResult<()> {
        if !goals.is_valid() {
            return Err(SyncError::Invalid("daily goals must all be positive".to_string()));
        }

        self.write_with_fallback(
            EntityFamily::Goals,
            MirrorPolicy::OnRemoteFailure,
            |target| async move {
                let doc = target.user_collection(SETTINGS).doc(GOALS_DOC);
                target.store.set(&doc, to_document(goals)?, SetOptions::REPLACE).await
            },
            |local| local.put(goals),
        )
        .await
    }

    /// Saved goals, with defaults filling anything never saved.
    pub async fn get_user_goals(&self) -> SyncResult<UserGoals> {
        self.read_with_fallback(
            EntityFamily::Goals,
            ReadPolicy::TrustRemote,
            |target| async move {
                let doc = target.user_collection(SETTINGS).doc(GOALS_DOC);
                match target.store.get(&doc).await? {
                    Some(data) => from_remote(data),
                    None => Ok(UserGoals::default()),
                }
            },
            |local| Ok(local.get::<UserGoals>(USER_GOALS_KEY)?.unwrap_or_default()),
        )
        .await
    }

    pub async fn update_study_time(&self, minutes: u32) -> SyncResult<()> {
        self.add_study_time(StudyDelta::study(minutes)).await
    }

    pub async fn update_speaking_time(&self, minutes: u32) -> SyncResult<()> {
        self.add_study_time(StudyDelta::speaking(minutes)).await
    }

    /// Today's stat plus the number of words and pronunciation attempts
    /// recorded since local midnight.
    pub async fn get_daily_progress(&self) -> SyncResult<DailyProgress> {
        let date = self.clock.today_key();
        let since = self.clock.start_of_today_ms();

        let stat = self.read_with_fallback(
            EntityFamily::DailyStats,
            ReadPolicy::LocalIfEmpty(Option::is_none),
            |target| {
                let date = &date;
                async move {
                    let doc = target.user_collection(DAILY_STATS).doc(date.as_str());
                    match target.store.get(&doc).await? {
                        Some(data) => from_remote::<DailyStat>(data).map(Some),
                        None => Ok(None),
                    }
                }
            },
            |local| local.get::<DailyStat>(&date),
        );

        let words_reviewed = self.read_with_fallback(
            EntityFamily::Vocabulary,
            ReadPolicy::LocalIfEmpty(is_zero),
            |target| async move {
                let query = Query::new().where_gte("lastReviewed", since);
                let docs = target.store.query(&target.user_collection(VOCABULARY), &query).await?;
                Ok(docs.len())
            },
            |local| {
                let reviewed: Vec<VocabularyRecord> =
                    local.query_by_index(Index::ByLastReviewed, IndexRange::AtLeast(since.into()), Order::Asc, None)?;
                Ok(reviewed.len())
            },
        );

        let pronunciation_count = self.read_with_fallback(
            EntityFamily::Pronunciation,
            ReadPolicy::LocalIfEmpty(is_zero),
            |target| async move {
                let query = Query::new().where_gte("timestamp", since);
                let docs = target.store.query(&target.user_collection(PRONUNCIATION), &query).await?;
                Ok(docs.len())
            },
            |local| {
                let attempts: Vec<PronunciationAttempt> =
                    local.query_by_index(Index::ByTimestamp, IndexRange::AtLeast(since.into()), Order::Asc, None)?;
                Ok(attempts.len())
            },
        );

        // The reads share one deadline window instead of stacking.
        let (stat, words_reviewed, pronunciation_count) =
            futures::join!(stat, words_reviewed, pronunciation_count);
        let (stat, words_reviewed, pronunciation_count) = (stat?, words_reviewed?, pronunciation_count?);

        let stat = stat.unwrap_or(DailyStat {
            date,
            minutes: 0,
            speaking_minutes: None,
        });

        Ok(DailyProgress {
            minutes_spent: stat.minutes,
            words_reviewed: words_reviewed as u32,
            speaking_minutes: stat.speaking_minutes.unwrap_or(0),
            pronunciation_count: pronunciation_count as u32,
        })
    }

    /// Totals across everything the user has saved.
    pub async fn get_user_stats(&self) -> SyncResult<UserStats> {
        let (total_words, results) = self
            .read_with_fallback(
                EntityFamily::Results,
                ReadPolicy::TrustRemote,
                |target| async move {
                    let everything = Query::new();
                    let words_path = target.user_collection(VOCABULARY);
                    let results_path = target.user_collection(RESULTS);
                    let (words, results) = futures::try_join!(
                        target.store.query(&words_path, &everything),
                        target.store.query(&results_path, &everything),
                    )?;
                    Ok((words.len(), decode_all::<ResultRecord>(&results)))
                },
                |local| Ok((local.count::<VocabularyRecord>()?, local.get_all::<ResultRecord>()?)),
            )
            .await?;

        Ok(UserStats::from_parts(total_words, &results))
    }

    async fn add_study_time(&self, delta: StudyDelta) -> SyncResult<()> {
        if delta == StudyDelta::default() {
            return Ok(());
        }

        let date = self.clock.today_key();
        let date = date.as_str();
        self.write_with_fallback(
            EntityFamily::DailyStats,
            MirrorPolicy::OnRemoteFailure,
            |target| async move {
                let doc = target.user_collection(DAILY_STATS).doc(date);
                let existing = match target.store.get(&doc).await? {
                    Some(data) => Some(from_remote::<DailyStat>(data)?),
                    None => None,
                };
                let merged = merge_daily_stat(existing, date, delta);
                target.store.set(&doc, to_document(&merged)?, SetOptions::MERGE).await
            },
            |local| {
                let existing = local.get::<DailyStat>(date)?;
                local.put(&merge_daily_stat(existing, date, delta))
            },
        )
        .await
    }
}

fn is_zero(count: &usize) -> bool {
    *count == 0
}

fn from_remote<T: serde::de::DeserializeOwned>(data: serde_json::Map<String, Value>) -> RemoteResult<T> {
    serde_json::from_value(Value::Object(data)).map_err(|err| RemoteError::new("data-loss", err.to_string()))
}
