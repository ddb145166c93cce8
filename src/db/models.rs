use crate::crawler::models::{RawMeal, MAX_INGREDIENT_SLOTS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub area: Option<String>,
    pub instructions: Option<String>,
    pub thumbnail: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IngredientLine {
    pub name: String,
    pub measure: String,
    /// 1-based slot in the catalog record
    pub position: i64,
}

/// Normalized meal ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeal {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub area: Option<String>,
    pub instructions: Option<String>,
    pub thumbnail: Option<String>,
    pub tags: Option<String>,
    pub ingredients: Vec<IngredientLine>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl NewMeal {
    /// Normalize a catalog record. Returns `None` when the id is unusable.
    ///
    /// Text fields are trimmed and blanks become `None`. Ingredient slots
    /// with a blank name are dropped; when a name repeats, the later slot
    /// replaces the earlier one.
    pub fn from_raw(raw: &RawMeal) -> Option<Self> {
        let id = raw.id()?;

        let mut ingredients: Vec<IngredientLine> = Vec::new();
        for position in 1..=MAX_INGREDIENT_SLOTS {
            let (name, measure) = raw.slot(position);
            let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
                continue;
            };

            ingredients.retain(|line| line.name != name);
            ingredients.push(IngredientLine {
                name: name.to_string(),
                measure: measure.unwrap_or_default().trim().to_string(),
                position: position as i64,
            });
        }

        Some(Self {
            id,
            name: clean(&raw.name).unwrap_or_default(),
            category: clean(&raw.category),
            area: clean(&raw.area),
            instructions: clean(&raw.instructions),
            thumbnail: clean(&raw.thumbnail),
            tags: clean(&raw.tags),
            ingredients,
        })
    }

    /// Ingredient names as indexed for full-text search
    pub fn ingredient_text(&self) -> String {
        self.ingredients
            .iter()
            .map(|line| line.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A search match with its bm25 score (lower is better)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealHit {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub meal: Meal,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealDetails {
    #[serde(flatten)]
    pub meal: Meal,
    pub ingredients: Vec<IngredientLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Completed,
    Failed,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Running => "running",
            BuildStatus::Completed => "completed",
            BuildStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BuildRun {
    pub id: i64,
    pub status: String,
    pub shards_total: i64,
    pub shards_failed: i64,
    pub records_fetched: i64,
    pub records_unique: i64,
    pub records_indexed: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counters written to a build run when it completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCounts {
    pub shards_failed: i64,
    pub records_fetched: i64,
    pub records_unique: i64,
    pub records_indexed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub meals: i64,
    pub ingredient_lines: i64,
    pub latest_run: Option<BuildRun>,
}
