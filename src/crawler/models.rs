use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Number of numbered ingredient/measure slots in a catalog record
pub const MAX_INGREDIENT_SLOTS: usize = 20;

/// A meal exactly as the catalog returns it.
///
/// Every field may be null or missing. Numbered ingredient slots and any
/// field we do not model are kept in `extra` so a record survives a
/// snapshot round trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMeal {
    #[serde(rename = "idMeal", default)]
    pub id_meal: Option<Value>,
    #[serde(rename = "strMeal", default)]
    pub name: Option<String>,
    #[serde(rename = "strCategory", default)]
    pub category: Option<String>,
    #[serde(rename = "strArea", default)]
    pub area: Option<String>,
    #[serde(rename = "strInstructions", default)]
    pub instructions: Option<String>,
    #[serde(rename = "strMealThumb", default)]
    pub thumbnail: Option<String>,
    #[serde(rename = "strTags", default)]
    pub tags: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawMeal {
    /// Numeric id, accepting either a decimal string or a JSON integer
    pub fn id(&self) -> Option<i64> {
        match self.id_meal.as_ref()? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Id as it appeared on the wire, for log messages
    pub fn id_label(&self) -> String {
        match &self.id_meal {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "<missing>".to_string(),
        }
    }

    /// Ingredient name and measure for a 1-based slot
    pub fn slot(&self, position: usize) -> (Option<&str>, Option<&str>) {
        let text = |field: String| self.extra.get(&field).and_then(Value::as_str);
        (
            text(format!("strIngredient{position}")),
            text(format!("strMeasure{position}")),
        )
    }

    /// Set a slot; used when building records by hand
    pub fn with_slot(mut self, position: usize, ingredient: &str, measure: &str) -> Self {
        self.extra.insert(
            format!("strIngredient{position}"),
            Value::String(ingredient.to_string()),
        );
        self.extra.insert(
            format!("strMeasure{position}"),
            Value::String(measure.to_string()),
        );
        self
    }
}

/// `{"meals": [...]}` response body; `"meals": null` means no results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MealsEnvelope {
    #[serde(default)]
    pub meals: Option<Vec<RawMeal>>,
}

/// Body of the `list.php` endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEnvelope {
    #[serde(default)]
    pub meals: Option<Vec<Map<String, Value>>>,
}

/// Which basic list to request from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Categories,
    Areas,
    Ingredients,
}

impl ListKind {
    /// Query parameter name for `list.php`
    pub fn param(self) -> &'static str {
        match self {
            ListKind::Categories => "c",
            ListKind::Areas => "a",
            ListKind::Ingredients => "i",
        }
    }

    /// Field carrying the name in each list entry
    pub fn field(self) -> &'static str {
        match self {
            ListKind::Categories => "strCategory",
            ListKind::Areas => "strArea",
            ListKind::Ingredients => "strIngredient",
        }
    }
}

impl FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "c" | "category" | "categories" => Ok(ListKind::Categories),
            "a" | "area" | "areas" => Ok(ListKind::Areas),
            "i" | "ingredient" | "ingredients" => Ok(ListKind::Ingredients),
            other => Err(format!(
                "unknown list '{other}' (expected categories, areas or ingredients)"
            )),
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListKind::Categories => "categories",
            ListKind::Areas => "areas",
            ListKind::Ingredients => "ingredients",
        };
        f.write_str(name)
    }
}
