//! UI Surfaces
//!
//! The closed set of message surfaces the bot maintains: the rating surface
//! (dropdowns) and the results surface (display-only embed). Variants expose
//! {describe, components, render}; the discriminant decides which component
//! set a revival re-binds.

use crate::models::records::{CompiledScore, RatingCategory, GLOBAL_RESULTS_KEY};
use crate::services::platform::{MessagePayload, SelectGroup};
use crate::services::scores::star_display;
use crate::utils::error::{BotError, BotResult};

/// The two surface variants tracked per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Rating,
    Results,
}

impl SurfaceKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Rating => "rating",
            Self::Results => "results",
        }
    }

    /// Component groups to (re)bind for this surface.
    ///
    /// The results surface is display-only and binds nothing.
    pub fn components(&self, entity_id: &str) -> Vec<SelectGroup> {
        match self {
            Self::Rating => RatingCategory::ALL
                .iter()
                .map(|category| SelectGroup {
                    custom_id: format!("rate:{}:{}", entity_id, category),
                    placeholder: category.to_string(),
                    options: (1..=5).map(|i| i.to_string()).collect(),
                })
                .collect(),
            Self::Results => Vec::new(),
        }
    }
}

/// Build the rating surface for an entity: embed plus three dropdowns
pub fn rating_payload(entity_id: &str) -> MessagePayload {
    MessagePayload {
        title: format!("Rate {}", entity_id),
        body: "Use the dropdowns below to rate (1-5).".to_string(),
        fields: RatingCategory::ALL
            .iter()
            .map(|category| (category.to_string(), category.legend().to_string()))
            .collect(),
        components: SurfaceKind::Rating.components(entity_id),
    }
}

/// Build a results surface from compiled scores.
///
/// `entity_filter` of `None` (or the global key) renders every entity; a
/// specific id renders only that entity and errors when it has no scores.
pub fn results_payload(
    scores: &[CompiledScore],
    entity_filter: Option<&str>,
    interval_mins: u64,
) -> BotResult<MessagePayload> {
    let filter = entity_filter.filter(|id| *id != GLOBAL_RESULTS_KEY);
    let selected: Vec<&CompiledScore> = match filter {
        Some(id) => {
            let matched: Vec<&CompiledScore> =
                scores.iter().filter(|s| s.entity_id == id).collect();
            if matched.is_empty() {
                return Err(BotError::not_found(format!("entity '{}' has no scores", id)));
            }
            matched
        }
        None => scores.iter().collect(),
    };

    // One embed field per entity, category lines in fixed order
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut current: Option<&str> = None;
    for score in &selected {
        if current != Some(score.entity_id.as_str()) {
            current = Some(score.entity_id.as_str());
            let lines = RatingCategory::ALL
                .iter()
                .map(|category| {
                    let value = selected
                        .iter()
                        .find(|s| s.entity_id == score.entity_id && s.category == *category)
                        .map(|s| s.score)
                        .unwrap_or(0.0);
                    format!("{}: {}", category, star_display(value))
                })
                .collect::<Vec<_>>()
                .join("\n");
            fields.push((score.entity_id.clone(), lines));
        }
    }

    Ok(MessagePayload {
        title: match filter {
            Some(id) => format!("{} Rating", id),
            None => "Community Ratings".to_string(),
        },
        body: format!("Auto-updates every {} minutes.", interval_mins),
        fields,
        components: SurfaceKind::Results.components(""),
    })
}
