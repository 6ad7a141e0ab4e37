//! Entity definitions shared by both stores.
//!
//! Field names serialize in camelCase so the same JSON shape is used for the
//! local `data` column and for remote documents.

use serde::{Deserialize, Serialize};

// ============================================================
// Shared enums
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Quiz,
    Exam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HskLevel {
    #[default]
    #[serde(rename = "HSK1")]
    Hsk1,
    #[serde(rename = "HSK2")]
    Hsk2,
    #[serde(rename = "HSK3")]
    Hsk3,
    #[serde(rename = "HSK4")]
    Hsk4,
    #[serde(rename = "HSK5")]
    Hsk5,
    #[serde(rename = "HSK6")]
    Hsk6,
}

impl HskLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            HskLevel::Hsk1 => "HSK1",
            HskLevel::Hsk2 => "HSK2",
            HskLevel::Hsk3 => "HSK3",
            HskLevel::Hsk4 => "HSK4",
            HskLevel::Hsk5 => "HSK5",
            HskLevel::Hsk6 => "HSK6",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HSK1" => Some(Self::Hsk1),
            "HSK2" => Some(Self::Hsk2),
            "HSK3" => Some(Self::Hsk3),
            "HSK4" => Some(Self::Hsk4),
            "HSK5" => Some(Self::Hsk5),
            "HSK6" => Some(Self::Hsk6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Hard,
    Good,
    Easy,
}

// ============================================================
// Results
// ============================================================

/// Completed quiz or exam. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub score: u32,
    pub total: u32,
    pub level: HskLevel,
    pub date: String,
    pub timestamp: i64,
}

impl ResultRecord {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.score) / f64::from(self.total) * 100.0
    }
}

// ============================================================
// Vocabulary
// ============================================================

/// Flashcard content as the UI holds it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabCard {
    pub character: String,
    pub pinyin: String,
    pub translation: String,
    pub example_sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_pinyin: Option<String>,
    pub example_translation: String,
    /// Possibly stale copy of the bookmark flag.
    #[serde(default)]
    pub bookmarked: bool,
}

/// One record per character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyRecord {
    pub character: String,
    #[serde(default)]
    pub pinyin: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub example_sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_pinyin: Option<String>,
    #[serde(default)]
    pub example_translation: String,
    #[serde(default)]
    pub level: HskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_image: Option<String>,
    /// Zero for records that were bookmarked or illustrated but never rated.
    #[serde(default)]
    pub last_reviewed: i64,
}

impl VocabularyRecord {
    pub fn is_bookmarked(&self) -> bool {
        self.bookmarked.unwrap_or(false)
    }
}

// ============================================================
// Pronunciation
// ============================================================

pub const MAX_PRONUNCIATION_SCORE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PronunciationAttempt {
    pub word: String,
    pub heard: String,
    pub pinyin: String,
    pub score: u8,
    pub feedback: String,
    /// Data URI of the learner's recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    pub timestamp: i64,
}

impl PronunciationAttempt {
    pub fn key(&self) -> String {
        format!("{}_{}", self.word, self.timestamp)
    }
}

// ============================================================
// Daily stats and goals
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    /// `YYYY-MM-DD` in local time.
    pub date: String,
    pub minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking_minutes: Option<u32>,
}

/// Partially saved objects deserialize with the missing fields taken from
/// [`UserGoals::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserGoals {
    pub daily_words: u32,
    pub daily_minutes: u32,
    pub daily_speaking_minutes: u32,
    pub daily_pronunciation: u32,
}

impl Default for UserGoals {
    fn default() -> Self {
        Self {
            daily_words: 10,
            daily_minutes: 15,
            daily_speaking_minutes: 5,
            daily_pronunciation: 10,
        }
    }
}

impl UserGoals {
    pub fn is_valid(&self) -> bool {
        self.daily_words > 0
            && self.daily_minutes > 0
            && self.daily_speaking_minutes > 0
            && self.daily_pronunciation > 0
    }
}

// ============================================================
// Shared audio cache
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCacheEntry {
    /// Normalized text the audio was generated from.
    pub text: String,
    /// Base64-encoded PCM.
    pub audio: String,
    pub timestamp: i64,
}

// ============================================================
// Chat
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingUrl {
    pub uri: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_urls: Option<Vec<GroundingUrl>>,
    pub timestamp: i64,
}

// ============================================================
// Derived aggregates
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayCount {
    /// Short English weekday name, e.g. `Mon`.
    pub day: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_words: u32,
    /// Rounded mean of score/total*100 across quizzes; 0 without quizzes.
    pub quiz_average: u32,
    pub exams_taken: u32,
}

impl UserStats {
    pub fn from_parts(total_words: usize, results: &[ResultRecord]) -> Self {
        let quizzes: Vec<f64> = results
            .iter()
            .filter(|r| r.kind == ResultKind::Quiz && r.total > 0)
            .map(ResultRecord::percentage)
            .collect();

        let quiz_average = if quizzes.is_empty() {
            0
        } else {
            (quizzes.iter().sum::<f64>() / quizzes.len() as f64).round() as u32
        };

        let exams_taken = results
            .iter()
            .filter(|r| r.kind == ResultKind::Exam)
            .count();

        Self {
            total_words: total_words as u32,
            quiz_average,
            exams_taken: exams_taken as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyProgress {
    pub minutes_spent: u32,
    pub words_reviewed: u32,
    pub speaking_minutes: u32,
    pub pronunciation_count: u32,
}
