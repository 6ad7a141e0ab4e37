use crate::clock::date_key;
use crate::config::RECENT_RESULTS_LIMIT;
use crate::coordinator::{
    decode_all, EntityFamily, MirrorPolicy, ReadPolicy, SyncCoordinator, SyncError, SyncResult, RESULTS,
};
use crate::local::{Index, IndexRange, Order};
use crate::models::{HskLevel, ResultKind, ResultRecord};
use crate::remote::{to_document, Direction, Query};

impl SyncCoordinator {
    /// Appends a quiz or exam outcome stamped with the current time.
    pub async fn save_result(
        &self,
        kind: ResultKind,
        score: u32,
        total: u32,
        level: HskLevel,
    ) -> SyncResult<ResultRecord> {
        if total == 0 {
            return Err(SyncError::Invalid("result total must be positive".to_string()));
        }

        let now = self.clock.now();
        let record = ResultRecord {
            kind,
            score,
            total,
            level,
            date: date_key(&now),
            timestamp: now.timestamp_millis(),
        };

        let saved = &record;
        self.write_with_fallback(
            EntityFamily::Results,
            MirrorPolicy::OnRemoteFailure,
            |target| async move {
                let body = to_document(saved)?;
                target.store.add(&target.user_collection(RESULTS), body).await?;
                Ok(())
            },
            |local| local.put(saved),
        )
        .await?;

        Ok(record)
    }

    /// Most recent results first, at most [`RECENT_RESULTS_LIMIT`].
    pub async fn get_recent_results(&self) -> SyncResult<Vec<ResultRecord>> {
        self.read_with_fallback(
            EntityFamily::Results,
            ReadPolicy::TrustRemote,
            |target| async move {
                let query = Query::new()
                    .order_by("timestamp", Direction::Desc)
                    .limit(RECENT_RESULTS_LIMIT);
                let docs = target.store.query(&target.user_collection(RESULTS), &query).await?;
                Ok(decode_all(&docs))
            },
            |local| {
                local.query_by_index(
                    Index::ByTimestamp,
                    IndexRange::All,
                    Order::Desc,
                    Some(RECENT_RESULTS_LIMIT),
                )
            },
        )
        .await
    }
}
