#![allow(dead_code)]

use mealrag::config::{
    CacheConfig, CatalogConfig, DatabaseConfig, DelegateConfig, IndexConfig, RetrievalConfig,
    ServerConfig, Settings,
};
use mealrag::crawler::models::RawMeal;
use mealrag::db::{self, models::Meal, DbPool};
use serde_json::{json, Value};
use std::path::Path;

/// Settings rooted in a temp directory, pointing at a mock catalog
pub fn settings(root: &Path, base_url: &str) -> Settings {
    Settings {
        catalog: CatalogConfig {
            base_url: base_url.to_string(),
            api_key: "1".to_string(),
            request_timeout_seconds: 5,
            fetch_concurrency: 4,
            requests_per_second: 1000,
            user_agent: "mealrag-tests".to_string(),
        },
        cache: CacheConfig {
            dir: root.join("cache"),
            ttl_hours: 24,
        },
        database: DatabaseConfig {
            url: format!("sqlite:{}", root.join("data").join("meals.db").display()),
            max_connections: 5,
            connection_timeout_seconds: 30,
        },
        index: IndexConfig {
            batch_size: 2,
            snapshot_path: root.join("data").join("meals.json"),
        },
        retrieval: RetrievalConfig {
            default_k: 5,
            max_k: 50,
        },
        delegate: DelegateConfig {
            url: None,
            api_key: None,
            model: "openai:gpt-4o".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
    }
}

pub async fn pool(root: &Path) -> DbPool {
    db::open_index(&settings(root, "http://127.0.0.1:9").database)
        .await
        .expect("Failed to open index")
}

/// Catalog record as served on the wire
pub fn meal_json(id: i64, name: &str, instructions: &str, ingredients: &[(&str, &str)]) -> Value {
    let mut meal = json!({
        "idMeal": id.to_string(),
        "strMeal": name,
        "strCategory": "Miscellaneous",
        "strArea": "Unknown",
        "strInstructions": instructions,
        "strMealThumb": format!("https://www.themealdb.com/images/media/meals/{id}.jpg"),
        "strTags": null,
    });

    let object = meal.as_object_mut().expect("object");
    for slot in 1..=20 {
        let (ingredient, measure) = ingredients
            .get(slot - 1)
            .map(|(i, m)| (json!(i), json!(m)))
            .unwrap_or((json!(""), json!(null)));
        object.insert(format!("strIngredient{slot}"), ingredient);
        object.insert(format!("strMeasure{slot}"), measure);
    }

    meal
}

pub fn raw_meal(id: i64, name: &str, instructions: &str, ingredients: &[(&str, &str)]) -> RawMeal {
    serde_json::from_value(meal_json(id, name, instructions, ingredients))
        .expect("valid meal record")
}

/// Every stored row of the index, in a stable order
#[derive(Debug, PartialEq)]
pub struct IndexDump {
    pub meals: Vec<Meal>,
    pub ingredient_lines: Vec<(i64, String, String, i64)>,
    pub fulltext: Vec<(i64, String, String, String, String, String, String)>,
}

pub async fn dump_index(pool: &DbPool) -> IndexDump {
    IndexDump {
        meals: sqlx::query_as("SELECT * FROM meals ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap(),
        ingredient_lines: sqlx::query_as(
            "SELECT meal_id, ingredient, measure, position FROM meal_ingredients ORDER BY meal_id, position",
        )
        .fetch_all(pool)
        .await
        .unwrap(),
        fulltext: sqlx::query_as(
            "SELECT rowid, name, instructions, tags, category, area, ingredients FROM meals_fts ORDER BY rowid",
        )
        .fetch_all(pool)
        .await
        .unwrap(),
    }
}
