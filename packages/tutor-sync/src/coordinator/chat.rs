//! Chat transcript. Lives only in the remote store: with no usable remote,
//! saves are dropped and history reads come back empty.

use serde_json::{Map, Value};

use crate::config::CHAT_HISTORY_LIMIT;
use crate::coordinator::{
    decode_all, EntityFamily, RemoteOutcome, SyncCoordinator, SyncError, SyncResult, CHAT_HISTORY,
};
use crate::models::ChatMessage;
use crate::remote::{to_document, Direction, Query, RemotePath, SetOptions};

impl SyncCoordinator {
    pub async fn save_chat_message(&self, message: &ChatMessage) -> SyncResult<()> {
        let outcome = self
            .attempt_remote(EntityFamily::Chat, |target| async move {
                let doc = target.user_collection(CHAT_HISTORY).doc(message.id.clone());
                target.store.set(&doc, to_document(message)?, SetOptions::REPLACE).await
            })
            .await;
        chat_write_result(outcome)
    }

    /// The last [`CHAT_HISTORY_LIMIT`] messages, oldest first.
    pub async fn get_chat_history(&self) -> Vec<ChatMessage> {
        let outcome = self
            .attempt_remote(EntityFamily::Chat, |target| async move {
                let query = Query::new()
                    .order_by("timestamp", Direction::Desc)
                    .limit(CHAT_HISTORY_LIMIT);
                let docs = target.store.query(&target.user_collection(CHAT_HISTORY), &query).await?;
                Ok(decode_all::<ChatMessage>(&docs))
            })
            .await;

        match outcome {
            RemoteOutcome::Done(mut messages) => {
                messages.reverse();
                messages
            }
            RemoteOutcome::Skipped(_) | RemoteOutcome::Failed(_) => Vec::new(),
        }
    }

    pub async fn clear_chat_history(&self) -> SyncResult<()> {
        let outcome = self
            .attempt_remote(EntityFamily::Chat, |target| async move {
                let collection = target.user_collection(CHAT_HISTORY);
                let docs = target.store.query(&collection, &Query::new()).await?;
                let paths: Vec<RemotePath> = docs.into_iter().map(|doc| doc.path).collect();
                if !paths.is_empty() {
                    target.store.batch_delete(&paths).await?;
                }
                tracing::info!(deleted = paths.len(), "chat history cleared");
                Ok(())
            })
            .await;
        chat_write_result(outcome)
    }

    /// Attaches generated speech to an already saved message.
    pub async fn update_message_audio(&self, message_id: &str, audio: &str) -> SyncResult<()> {
        let outcome = self
            .attempt_remote(EntityFamily::Chat, |target| async move {
                let doc = target.user_collection(CHAT_HISTORY).doc(message_id);
                let mut fields = Map::new();
                fields.insert("audio".to_string(), Value::String(audio.to_string()));
                target.store.set(&doc, fields, SetOptions::MERGE).await
            })
            .await;
        chat_write_result(outcome)
    }
}

fn chat_write_result(outcome: RemoteOutcome<()>) -> SyncResult<()> {
    match outcome {
        RemoteOutcome::Done(()) => Ok(()),
        RemoteOutcome::Skipped(reason) => {
            tracing::debug!(?reason, "chat is remote-only; nothing persisted");
            Ok(())
        }
        RemoteOutcome::Failed(failure) => Err(SyncError::Remote(failure)),
    }
}
