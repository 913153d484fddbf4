//! Compatibility score between two skills.
//!
//! The score is persisted on every match at creation time, so the arithmetic
//! here must never change.

use crate::model::{Mode, SkillProfile};

/// Points for an equal category.
pub const CATEGORY_POINTS: u8 = 40;
/// Points when the teaching level covers the learner's level.
pub const LEVEL_COVERED_POINTS: u8 = 30;
/// Points when the teaching level is exactly one rank below.
pub const LEVEL_NEAR_POINTS: u8 = 20;
/// Points for compatible exchange modes.
pub const MODE_POINTS: u8 = 20;
/// Points per shared tag.
pub const TAG_POINTS: u8 = 2;
/// Cap on the tag contribution.
pub const MAX_TAG_POINTS: u8 = 10;
/// Cap on the total score.
pub const MAX_SCORE: u8 = 100;

/// Score how well `teaching` fits `learning`, in `0..=100`.
///
/// Only the level term is order-sensitive: the first skill is treated as the
/// one being taught.
#[must_use]
pub fn score(teaching: &SkillProfile, learning: &SkillProfile) -> u8 {
    let mut total: u32 = 0;

    if teaching.category == learning.category {
        total += u32::from(CATEGORY_POINTS);
    }

    let teach_rank = teaching.level.rank();
    let learn_rank = learning.level.rank();
    if teach_rank >= learn_rank {
        total += u32::from(LEVEL_COVERED_POINTS);
    } else if teach_rank + 1 == learn_rank {
        total += u32::from(LEVEL_NEAR_POINTS);
    }

    if modes_compatible(teaching, learning) {
        total += u32::from(MODE_POINTS);
    }

    total += u32::from(tag_points(&teaching.tags, &learning.tags));

    total.min(u32::from(MAX_SCORE)) as u8
}

fn modes_compatible(a: &SkillProfile, b: &SkillProfile) -> bool {
    a.mode == b.mode || a.mode == Mode::Both || b.mode == Mode::Both
}

/// Each tag of `first` also present in `second` is worth two points, up to ten.
fn tag_points(first: &[String], second: &[String]) -> u8 {
    let shared = first.iter().filter(|tag| second.contains(tag)).count();
    let points = shared.saturating_mul(usize::from(TAG_POINTS));
    points.min(usize::from(MAX_TAG_POINTS)) as u8
}
