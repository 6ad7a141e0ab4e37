//! Partial vocabulary updates applied in any order keep every field's latest
//! value and never clear a field they do not carry.

use proptest::prelude::*;

use tutor_sync::merge::{merge_vocab, VocabPatch};
use tutor_sync::models::{HskLevel, Rating, VocabCard, VocabularyRecord};

#[derive(Debug, Clone)]
enum Update {
    Rate(Rating, i64),
    Bookmark(bool),
    Image(String),
}

fn arb_rating() -> impl Strategy<Value = Rating> {
    prop_oneof![Just(Rating::Hard), Just(Rating::Good), Just(Rating::Easy)]
}

fn arb_update() -> impl Strategy<Value = Update> {
    prop_oneof![
        (arb_rating(), 1i64..=4_000_000_000_000i64).prop_map(|(rating, at)| Update::Rate(rating, at)),
        any::<bool>().prop_map(Update::Bookmark),
        "[A-Za-z0-9+/]{4,16}".prop_map(|payload| Update::Image(format!("data:image/png;base64,{payload}"))),
    ]
}

fn card() -> VocabCard {
    VocabCard {
        character: "学习".to_string(),
        pinyin: "xué xí".to_string(),
        translation: "to study".to_string(),
        example_sentence: "我喜欢学习中文。".to_string(),
        example_pinyin: None,
        example_translation: "I like studying Chinese.".to_string(),
        bookmarked: false,
    }
}

fn patch_for(update: &Update) -> VocabPatch {
    let base = VocabPatch::from_card(&card(), HskLevel::Hsk3);
    match update {
        Update::Rate(rating, at) => base.rated(*rating, *at),
        Update::Bookmark(flag) => base.bookmark(*flag),
        Update::Image(uri) => base.custom_image(uri.clone()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_each_field_keeps_its_latest_value(updates in prop::collection::vec(arb_update(), 1..24)) {
        let mut record: Option<VocabularyRecord> = None;
        for update in &updates {
            record = Some(merge_vocab(record, &patch_for(update)));
        }
        let record = record.expect("at least one update");

        let last_rating = updates.iter().rev().find_map(|u| match u {
            Update::Rate(rating, at) => Some((*rating, *at)),
            _ => None,
        });
        let last_bookmark = updates.iter().rev().find_map(|u| match u {
            Update::Bookmark(flag) => Some(*flag),
            _ => None,
        });
        let last_image = updates.iter().rev().find_map(|u| match u {
            Update::Image(uri) => Some(uri.clone()),
            _ => None,
        });

        prop_assert_eq!(record.rating, last_rating.map(|(rating, _)| rating));
        prop_assert_eq!(record.last_reviewed, last_rating.map_or(0, |(_, at)| at));
        prop_assert_eq!(record.bookmarked, last_bookmark);
        prop_assert_eq!(record.custom_image, last_image);
        prop_assert_eq!(record.level, HskLevel::Hsk3);
        prop_assert_eq!(record.translation.as_str(), "to study");
    }

    #[test]
    fn prop_untouched_fields_survive_a_single_patch(
        rating in arb_rating(),
        at in 1i64..=4_000_000_000_000i64,
        flag in any::<bool>(),
    ) {
        let rated = merge_vocab(None, &patch_for(&Update::Rate(rating, at)));
        let imaged = merge_vocab(Some(rated), &patch_for(&Update::Image("data:image/gif;base64,R0lG".to_string())));
        let bookmarked = merge_vocab(Some(imaged.clone()), &patch_for(&Update::Bookmark(flag)));

        prop_assert_eq!(bookmarked.rating, Some(rating));
        prop_assert_eq!(bookmarked.last_reviewed, at);
        prop_assert_eq!(bookmarked.custom_image, imaged.custom_image);
        prop_assert_eq!(bookmarked.bookmarked, Some(flag));
    }
}
