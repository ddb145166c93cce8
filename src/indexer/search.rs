use crate::db::{models::MealHit, read_error, DbPool};
use crate::error::Result;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Column weights for `bm25(meals_fts, ...)`, in table column order:
/// name, instructions, tags, category, area, ingredients
const COLUMN_WEIGHTS: &str = "10.0, 1.0, 2.0, 2.0, 2.0, 4.0";

fn punctuation() -> &'static Regex {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex"))
}

/// Replace everything that is not a word character or whitespace with a
/// space and trim the result
pub fn sanitize_query(query: &str) -> String {
    punctuation().replace_all(query, " ").trim().to_string()
}

/// Build an FTS5 match expression matching any of the query's terms.
///
/// Each term is quoted so operator words (`AND`, `OR`, `NOT`, `NEAR`) are
/// searched as plain text. Returns `None` when nothing searchable remains.
pub fn match_expression(query: &str) -> Option<String> {
    let sanitized = sanitize_query(query);
    let terms: Vec<String> = sanitized
        .split_whitespace()
        .map(|term| format!("\"{term}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Ranked full-text search over the indexed meals
#[derive(Clone)]
pub struct SearchIndex {
    pool: DbPool,
}

impl SearchIndex {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Best matches first (lowest bm25), ties broken by ascending id
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<MealHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        debug!("Searching meals with MATCH {}", expression);

        let sql = format!(
            r#"
            SELECT m.*, bm25(meals_fts, {COLUMN_WEIGHTS}) AS score
            FROM meals_fts
            JOIN meals m ON m.id = meals_fts.rowid
            WHERE meals_fts MATCH ?
            ORDER BY score ASC, m.id ASC
            LIMIT ?
            "#
        );

        let hits = sqlx::query_as::<_, MealHit>(&sql)
            .bind(&expression)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::models::RawMeal;
    use crate::db::{meals::upsert_meals, test_pool};
    use crate::error::Error;
    use serde_json::json;
    use tempfile::tempdir;

    fn raw(id: i64, name: &str, instructions: &str) -> RawMeal {
        RawMeal {
            id_meal: Some(json!(id.to_string())),
            name: Some(name.to_string()),
            instructions: Some(instructions.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_query() {
        assert_eq!(sanitize_query("chicken, rice & peas!"), "chicken  rice   peas");
        assert_eq!(sanitize_query("  ?!  "), "");
        assert_eq!(sanitize_query("crème brûlée"), "crème brûlée");
    }

    #[test]
    fn test_match_expression() {
        assert_eq!(
            match_expression("pasta, tomatoes").as_deref(),
            Some("\"pasta\" OR \"tomatoes\"")
        );
        assert_eq!(
            match_expression("salt AND NOT pepper").as_deref(),
            Some("\"salt\" OR \"AND\" OR \"NOT\" OR \"pepper\"")
        );
        assert_eq!(match_expression(""), None);
        assert_eq!(match_expression("\"*()"), None);
    }

    #[tokio::test]
    async fn test_search_ranks_and_limits() {
        let dir = tempdir().unwrap();
        let pool = test_pool(dir.path()).await;

        let meals = vec![
            raw(1, "Pasta Bake", "Bake it in the oven."),
            raw(2, "Beef Stew", "Serve with pasta on the side."),
            raw(3, "Fish Pie", "Top with mashed potato."),
        ];
        upsert_meals(&pool, &meals, 100).await.unwrap();

        let index = SearchIndex::new(pool);
        let hits = index.search("pasta", 10).await.unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.meal.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(hits[0].score <= hits[1].score);

        assert_eq!(index.search("pasta", 1).await.unwrap().len(), 1);
        assert!(index.search("pasta", 0).await.unwrap().is_empty());
        assert!(index.search("", 5).await.unwrap().is_empty());
        assert!(index.search("NEAR OR", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_without_schema_is_index_not_built() {
        let dir = tempdir().unwrap();
        let config = crate::config::DatabaseConfig {
            url: format!("sqlite:{}", dir.path().join("empty.db").display()),
            max_connections: 1,
            connection_timeout_seconds: 5,
        };
        let pool = crate::db::init_pool(&config).await.unwrap();

        let result = SearchIndex::new(pool).search("pasta", 5).await;
        assert!(matches!(result, Err(Error::IndexNotBuilt(_))));
    }
}
