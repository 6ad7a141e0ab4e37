//! Read-then-merge-then-write policies.
//!
//! Each function takes the record currently stored (if any) and a partial
//! update, and returns the record to write back. Fields the update does not
//! carry are copied from the existing record unchanged.

use serde::Serialize;

use crate::models::{DailyStat, HskLevel, Rating, VocabCard, VocabularyRecord};

/// Partial update to a [`VocabularyRecord`]. Serializes to exactly the fields
/// it carries so it can be sent as a merge-write to the remote store.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabPatch {
    pub character: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinyin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_sentence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_pinyin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<HskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<i64>,
}

impl VocabPatch {
    /// Card content plus level; carries none of the progress fields.
    pub fn from_card(card: &VocabCard, level: HskLevel) -> Self {
        Self {
            character: card.character.clone(),
            pinyin: Some(card.pinyin.clone()),
            translation: Some(card.translation.clone()),
            example_sentence: Some(card.example_sentence.clone()),
            example_pinyin: card.example_pinyin.clone(),
            example_translation: Some(card.example_translation.clone()),
            level: Some(level),
            ..Self::default()
        }
    }

    pub fn rated(mut self, rating: Rating, at_ms: i64) -> Self {
        self.rating = Some(rating);
        self.last_reviewed = Some(at_ms);
        self
    }

    pub fn bookmark(mut self, bookmarked: bool) -> Self {
        self.bookmarked = Some(bookmarked);
        self
    }

    pub fn custom_image(mut self, data_uri: impl Into<String>) -> Self {
        self.custom_image = Some(data_uri.into());
        self
    }
}

/// Overlays `patch` on `existing`. A record created by a patch without a
/// review time has `last_reviewed == 0` (never reviewed).
pub fn merge_vocab(existing: Option<VocabularyRecord>, patch: &VocabPatch) -> VocabularyRecord {
    let mut record = existing.unwrap_or_else(|| VocabularyRecord {
        character: patch.character.clone(),
        pinyin: String::new(),
        translation: String::new(),
        example_sentence: String::new(),
        example_pinyin: None,
        example_translation: String::new(),
        level: patch.level.unwrap_or_default(),
        rating: None,
        bookmarked: None,
        custom_image: None,
        last_reviewed: patch.last_reviewed.unwrap_or(0),
    });

    overlay(&mut record.pinyin, &patch.pinyin);
    overlay(&mut record.translation, &patch.translation);
    overlay(&mut record.example_sentence, &patch.example_sentence);
    overlay(&mut record.example_translation, &patch.example_translation);

    if patch.example_pinyin.is_some() {
        record.example_pinyin = patch.example_pinyin.clone();
    }
    if let Some(level) = patch.level {
        record.level = level;
    }
    if patch.rating.is_some() {
        record.rating = patch.rating;
    }
    if patch.bookmarked.is_some() {
        record.bookmarked = patch.bookmarked;
    }
    if patch.custom_image.is_some() {
        record.custom_image = patch.custom_image.clone();
    }
    if let Some(at) = patch.last_reviewed {
        record.last_reviewed = at;
    }

    record
}

fn overlay(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        target.clone_from(value);
    }
}

/// Additive change to a day's study time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StudyDelta {
    pub minutes: u32,
    pub speaking_minutes: u32,
}

impl StudyDelta {
    pub fn study(minutes: u32) -> Self {
        Self {
            minutes,
            speaking_minutes: 0,
        }
    }

    pub fn speaking(minutes: u32) -> Self {
        Self {
            minutes: 0,
            speaking_minutes: minutes,
        }
    }
}

/// Adds `delta` to the stored bucket for `date`, never overwriting it.
pub fn merge_daily_stat(existing: Option<DailyStat>, date: &str, delta: StudyDelta) -> DailyStat {
    let mut stat = existing.unwrap_or_else(|| DailyStat {
        date: date.to_string(),
        minutes: 0,
        speaking_minutes: None,
    });

    stat.minutes = stat.minutes.saturating_add(delta.minutes);
    if delta.speaking_minutes > 0 || stat.speaking_minutes.is_some() {
        let speaking = stat.speaking_minutes.unwrap_or(0);
        stat.speaking_minutes = Some(speaking.saturating_add(delta.speaking_minutes));
    }

    stat
}
