//! Store Records
//!
//! Typed views over the three tabs of the durable store: Metadata, Votes, and
//! Compiled. Rows travel as plain string cells; the parse functions here are
//! the single place that turns them into typed records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform snowflake for a conversation thread
pub type ThreadId = u64;
/// Platform snowflake for a message
pub type MessageId = u64;

/// Tab names in the durable store
pub const METADATA_TAB: &str = "Metadata";
pub const VOTES_TAB: &str = "Votes";
pub const COMPILED_TAB: &str = "Compiled";

/// Header rows enforced on startup
pub const METADATA_HEADER: [&str; 4] = [
    "thread_id",
    "entity_id",
    "rating_message_id",
    "results_message_id",
];
pub const VOTES_HEADER: [&str; 5] = ["user_id", "entity_id", "category", "value", "timestamp"];

/// Pseudo-entity tracking the guild-wide results surface
pub const GLOBAL_RESULTS_KEY: &str = "__all__";

// ---------------------------------------------------------------------------
// Rating categories
// ---------------------------------------------------------------------------

/// The three rating categories, each voted 1-5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatingCategory {
    Complexity,
    Sociability,
    Survivability,
}

impl RatingCategory {
    pub const ALL: [RatingCategory; 3] = [
        RatingCategory::Complexity,
        RatingCategory::Sociability,
        RatingCategory::Survivability,
    ];

    /// Short explanation shown on the rating surface
    pub fn legend(&self) -> &'static str {
        match self {
            Self::Complexity => "1 = very simple, 5 = very complex",
            Self::Sociability => "1 = mostly solitary, 5 = highly social",
            Self::Survivability => "1 = low survivability, 5 = very resilient",
        }
    }
}

impl fmt::Display for RatingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complexity => write!(f, "Complexity"),
            Self::Sociability => write!(f, "Sociability"),
            Self::Survivability => write!(f, "Survivability"),
        }
    }
}

impl FromStr for RatingCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Complexity" => Ok(Self::Complexity),
            "Sociability" => Ok(Self::Sociability),
            "Survivability" => Ok(Self::Survivability),
            _ => Err(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata records
// ---------------------------------------------------------------------------

/// One row of the Metadata tab: entity <-> thread <-> surface message ids.
///
/// A row missing `thread_id` or `entity_id` never parses into this type; it
/// stays in the store untouched for manual correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub thread_id: ThreadId,
    pub entity_id: String,
    pub rating_message_id: Option<MessageId>,
    pub results_message_id: Option<MessageId>,
}

/// Outcome of classifying one Metadata row during load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowValidity {
    Usable(MetadataRecord),
    /// Row kept in the store but excluded from the usable sequence
    Unusable { reason: String },
}

impl MetadataRecord {
    /// Classify a raw sheet row.
    ///
    /// `thread_id` must be a non-empty numeric cell and `entity_id` non-empty;
    /// the two message id cells are optional and tolerate junk (treated as
    /// unset rather than rejecting the row, matching the repair-by-hand rule).
    pub fn classify_row(row: &[String]) -> RowValidity {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");

        let thread_id = match cell(0).parse::<ThreadId>() {
            Ok(id) => id,
            Err(_) => {
                return RowValidity::Unusable {
                    reason: "missing or non-numeric thread_id".to_string(),
                }
            }
        };

        let entity_id = cell(1);
        if entity_id.is_empty() {
            return RowValidity::Unusable {
                reason: "missing entity_id".to_string(),
            };
        }

        RowValidity::Usable(MetadataRecord {
            thread_id,
            entity_id: entity_id.to_string(),
            rating_message_id: cell(2).parse::<MessageId>().ok(),
            results_message_id: cell(3).parse::<MessageId>().ok(),
        })
    }

    /// Serialize into the four Metadata tab cells
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.thread_id.to_string(),
            self.entity_id.clone(),
            self.rating_message_id.map(|m| m.to_string()).unwrap_or_default(),
            self.results_message_id.map(|m| m.to_string()).unwrap_or_default(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Vote records
// ---------------------------------------------------------------------------

/// One append-only row of the Votes tab.
///
/// Never mutated or deleted; repeated votes by the same user for the same
/// (entity, category) are collapsed at aggregation time, last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub user_id: String,
    pub entity_id: String,
    pub category: RatingCategory,
    pub value: u8,
    pub timestamp: DateTime<Utc>,
}

impl VoteRecord {
    /// Parse a raw Votes row; rows that do not parse are ignored by callers.
    pub fn from_row(row: &[String]) -> Option<VoteRecord> {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
        let category = cell(2).parse::<RatingCategory>().ok()?;
        let value = cell(3).parse::<u8>().ok()?;
        if !(1..=5).contains(&value) {
            return None;
        }
        let timestamp = DateTime::parse_from_rfc3339(cell(4)).ok()?.with_timezone(&Utc);
        let user_id = cell(0);
        let entity_id = cell(1);
        if user_id.is_empty() || entity_id.is_empty() {
            return None;
        }
        Some(VoteRecord {
            user_id: user_id.to_string(),
            entity_id: entity_id.to_string(),
            category,
            value,
            timestamp,
        })
    }

    /// Serialize into the five Votes tab cells
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.user_id.clone(),
            self.entity_id.clone(),
            self.category.to_string(),
            self.value.to_string(),
            self.timestamp.to_rfc3339(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Compiled scores
// ---------------------------------------------------------------------------

/// Aggregated score per (entity, category); derived, never source of truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScore {
    pub entity_id: String,
    pub category: RatingCategory,
    pub score: f64,
}

impl CompiledScore {
    /// Parse a raw Compiled row
    pub fn from_row(row: &[String]) -> Option<CompiledScore> {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
        let entity_id = cell(0);
        if entity_id.is_empty() {
            return None;
        }
        Some(CompiledScore {
            entity_id: entity_id.to_string(),
            category: cell(1).parse::<RatingCategory>().ok()?,
            score: cell(2).parse::<f64>().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_row_usable() {
        let validity = MetadataRecord::classify_row(&row(&["1001", "dino_raptor", "2001", "2002"]));
        match validity {
            RowValidity::Usable(rec) => {
                assert_eq!(rec.thread_id, 1001);
                assert_eq!(rec.entity_id, "dino_raptor");
                assert_eq!(rec.rating_message_id, Some(2001));
                assert_eq!(rec.results_message_id, Some(2002));
            }
            RowValidity::Unusable { reason } => panic!("expected usable, got: {}", reason),
        }
    }

    #[test]
    fn test_classify_row_missing_thread() {
        let validity = MetadataRecord::classify_row(&row(&["", "dino_trex", "", ""]));
        assert!(matches!(validity, RowValidity::Unusable { .. }));
    }

    #[test]
    fn test_classify_row_missing_entity() {
        let validity = MetadataRecord::classify_row(&row(&["1001", "", "2001", ""]));
        assert!(matches!(validity, RowValidity::Unusable { .. }));
    }

    #[test]
    fn test_classify_row_junk_message_ids_tolerated() {
        let validity = MetadataRecord::classify_row(&row(&["1001", "dino_raptor", "n/a", ""]));
        match validity {
            RowValidity::Usable(rec) => {
                assert_eq!(rec.rating_message_id, None);
                assert_eq!(rec.results_message_id, None);
            }
            RowValidity::Unusable { .. } => panic!("junk optional ids must not reject the row"),
        }
    }

    #[test]
    fn test_metadata_row_roundtrip() {
        let rec = MetadataRecord {
            thread_id: 42,
            entity_id: "dino_anky".to_string(),
            rating_message_id: Some(7),
            results_message_id: None,
        };
        let cells = rec.to_row();
        assert_eq!(cells, vec!["42", "dino_anky", "7", ""]);
        match MetadataRecord::classify_row(&cells) {
            RowValidity::Usable(parsed) => assert_eq!(parsed, rec),
            RowValidity::Unusable { reason } => panic!("roundtrip failed: {}", reason),
        }
    }

    #[test]
    fn test_category_parse_display() {
        for cat in RatingCategory::ALL {
            assert_eq!(cat.to_string().parse::<RatingCategory>(), Ok(cat));
        }
        assert!("Ferocity".parse::<RatingCategory>().is_err());
    }

    #[test]
    fn test_vote_row_roundtrip() {
        let vote = VoteRecord {
            user_id: "555".to_string(),
            entity_id: "dino_raptor".to_string(),
            category: RatingCategory::Sociability,
            value: 4,
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
        };
        let parsed = VoteRecord::from_row(&vote.to_row()).unwrap();
        assert_eq!(parsed, vote);
    }

    #[test]
    fn test_vote_row_rejects_out_of_range() {
        let mut cells = row(&["555", "dino_raptor", "Complexity", "9", "2026-03-01T12:00:00Z"]);
        assert!(VoteRecord::from_row(&cells).is_none());
        cells[3] = "0".to_string();
        assert!(VoteRecord::from_row(&cells).is_none());
    }

    #[test]
    fn test_compiled_row_parse() {
        let score = CompiledScore::from_row(&row(&["dino_raptor", "Complexity", "4.5"])).unwrap();
        assert_eq!(score.entity_id, "dino_raptor");
        assert_eq!(score.category, RatingCategory::Complexity);
        assert!((score.score - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compiled_row_parse_bad_score() {
        assert!(CompiledScore::from_row(&row(&["dino_raptor", "Complexity", "n/a"])).is_none());
    }
}
