//! Score Compilation
//!
//! Pure functions from raw vote rows to compiled per-entity scores. Votes are
//! append-only in the store, so aggregation first collapses repeated votes by
//! the same user for the same (entity, category) down to the most recent one.

use std::collections::HashMap;

use crate::models::records::{CompiledScore, RatingCategory, VoteRecord};

/// Star glyphs used by the results display
const FULL_STAR: char = '★';
const HALF_STAR: char = '⯪';
const EMPTY_STAR: char = '☆';

/// Keep only the most recent vote per (user, entity, category).
///
/// Ties on timestamp resolve to the later row, matching append order.
pub fn dedupe_votes(votes: &[VoteRecord]) -> Vec<VoteRecord> {
    let mut latest: HashMap<(String, String, RatingCategory), VoteRecord> = HashMap::new();
    for vote in votes {
        let key = (vote.user_id.clone(), vote.entity_id.clone(), vote.category);
        match latest.get(&key) {
            Some(existing) if existing.timestamp > vote.timestamp => {}
            _ => {
                latest.insert(key, vote.clone());
            }
        }
    }
    let mut deduped: Vec<VoteRecord> = latest.into_values().collect();
    deduped.sort_by(|a, b| {
        (&a.entity_id, &a.user_id, a.category.to_string())
            .cmp(&(&b.entity_id, &b.user_id, b.category.to_string()))
    });
    deduped
}

/// Mean score per (entity, category) over already-deduplicated votes.
///
/// Output is ordered by entity id then category for stable rendering.
pub fn compile(votes: &[VoteRecord]) -> Vec<CompiledScore> {
    let mut sums: HashMap<(String, RatingCategory), (f64, u32)> = HashMap::new();
    for vote in votes {
        let entry = sums
            .entry((vote.entity_id.clone(), vote.category))
            .or_insert((0.0, 0));
        entry.0 += f64::from(vote.value);
        entry.1 += 1;
    }
    let mut scores: Vec<CompiledScore> = sums
        .into_iter()
        .map(|((entity_id, category), (sum, count))| CompiledScore {
            entity_id,
            category,
            score: sum / f64::from(count),
        })
        .collect();
    scores.sort_by(|a, b| {
        (&a.entity_id, a.category.to_string()).cmp(&(&b.entity_id, b.category.to_string()))
    });
    scores
}

/// Render a 0-5 score as stars, half a star awarded at >= .5
pub fn star_display(score: f64) -> String {
    let clamped = score.clamp(0.0, 5.0);
    let full = clamped.floor() as usize;
    let half = usize::from(clamped - clamped.floor() >= 0.5);
    let empty = 5 - full - half;
    let mut out = String::new();
    out.extend(std::iter::repeat(FULL_STAR).take(full));
    out.extend(std::iter::repeat(HALF_STAR).take(half));
    out.extend(std::iter::repeat(EMPTY_STAR).take(empty));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn vote(user: &str, entity: &str, category: RatingCategory, value: u8, ts: &str) -> VoteRecord {
        VoteRecord {
            user_id: user.to_string(),
            entity_id: entity.to_string(),
            category,
            value,
            timestamp: ts.parse::<DateTime<Utc>>().unwrap(),
        }
    }

    #[test]
    fn test_dedupe_last_write_wins() {
        let votes = vec![
            vote("u1", "dino_raptor", RatingCategory::Complexity, 2, "2026-03-01T10:00:00Z"),
            vote("u1", "dino_raptor", RatingCategory::Complexity, 5, "2026-03-01T11:00:00Z"),
            vote("u1", "dino_raptor", RatingCategory::Complexity, 4, "2026-03-01T12:00:00Z"),
        ];
        let deduped = dedupe_votes(&votes);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].value, 4);
    }

    #[test]
    fn test_dedupe_keys_are_independent() {
        let votes = vec![
            vote("u1", "dino_raptor", RatingCategory::Complexity, 3, "2026-03-01T10:00:00Z"),
            vote("u1", "dino_raptor", RatingCategory::Sociability, 5, "2026-03-01T10:00:00Z"),
            vote("u2", "dino_raptor", RatingCategory::Complexity, 1, "2026-03-01T10:00:00Z"),
            vote("u1", "dino_anky", RatingCategory::Complexity, 2, "2026-03-01T10:00:00Z"),
        ];
        assert_eq!(dedupe_votes(&votes).len(), 4);
    }

    #[test]
    fn test_compile_means() {
        let votes = vec![
            vote("u1", "dino_raptor", RatingCategory::Complexity, 2, "2026-03-01T10:00:00Z"),
            vote("u2", "dino_raptor", RatingCategory::Complexity, 5, "2026-03-01T10:05:00Z"),
        ];
        let scores = compile(&votes);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].entity_id, "dino_raptor");
        assert!((scores[0].score - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compile_after_dedupe_collapses_revotes() {
        let votes = vec![
            vote("u1", "dino_raptor", RatingCategory::Survivability, 1, "2026-03-01T10:00:00Z"),
            vote("u1", "dino_raptor", RatingCategory::Survivability, 5, "2026-03-01T11:00:00Z"),
        ];
        let scores = compile(&dedupe_votes(&votes));
        assert_eq!(scores.len(), 1);
        assert!((scores[0].score - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_star_display() {
        assert_eq!(star_display(5.0), "★★★★★");
        assert_eq!(star_display(0.0), "☆☆☆☆☆");
        assert_eq!(star_display(3.5), "★★★⯪☆");
        assert_eq!(star_display(3.4), "★★★☆☆");
        assert_eq!(star_display(4.9), "★★★★⯪");
    }

    #[test]
    fn test_star_display_clamps() {
        assert_eq!(star_display(7.2), "★★★★★");
        assert_eq!(star_display(-1.0), "☆☆☆☆☆");
    }
}
