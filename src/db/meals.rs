use crate::crawler::models::RawMeal;
use crate::db::{models::*, read_error, runs, DbPool};
use crate::error::{Error, Result};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

/// Write catalog records to the index, replacing any earlier copy.
///
/// Records are applied in batches of `batch_size`, one transaction per
/// batch. A record whose id cannot be parsed is skipped. Any storage error
/// rolls back the current batch and is returned; batches already committed
/// stay committed. Returns the number of records written.
pub async fn upsert_meals(pool: &DbPool, meals: &[RawMeal], batch_size: usize) -> Result<usize> {
    let mut written = 0;

    for (batch_no, batch) in meals.chunks(batch_size.max(1)).enumerate() {
        let mut tx = pool.begin().await?;

        for raw in batch {
            let Some(meal) = NewMeal::from_raw(raw) else {
                warn!("Skipping meal with unparseable id {}", raw.id_label());
                continue;
            };

            write_meal(&mut *tx, &meal).await?;
            written += 1;
        }

        tx.commit().await?;
        debug!("Committed batch {} ({} records)", batch_no + 1, batch.len());
    }

    info!("Indexed {} meals", written);
    Ok(written)
}

/// Upsert one record with its ingredient lines and full-text row
async fn write_meal(conn: &mut SqliteConnection, meal: &NewMeal) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO meals (id, name, category, area, instructions, thumbnail, tags)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            area = excluded.area,
            instructions = excluded.instructions,
            thumbnail = excluded.thumbnail,
            tags = excluded.tags
        "#,
    )
    .bind(meal.id)
    .bind(&meal.name)
    .bind(&meal.category)
    .bind(&meal.area)
    .bind(&meal.instructions)
    .bind(&meal.thumbnail)
    .bind(&meal.tags)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM meal_ingredients WHERE meal_id = ?")
        .bind(meal.id)
        .execute(&mut *conn)
        .await?;

    for line in &meal.ingredients {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO meal_ingredients (meal_id, ingredient, measure, position)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(meal.id)
        .bind(&line.name)
        .bind(&line.measure)
        .bind(line.position)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM meals_fts WHERE rowid = ?")
        .bind(meal.id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO meals_fts (rowid, name, instructions, tags, category, area, ingredients)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(meal.id)
    .bind(&meal.name)
    .bind(meal.instructions.as_deref().unwrap_or_default())
    .bind(meal.tags.as_deref().unwrap_or_default())
    .bind(meal.category.as_deref().unwrap_or_default())
    .bind(meal.area.as_deref().unwrap_or_default())
    .bind(meal.ingredient_text())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Get meal by ID
pub async fn get_meal(pool: &DbPool, meal_id: i64) -> Result<Meal> {
    sqlx::query_as::<_, Meal>("SELECT * FROM meals WHERE id = ?")
        .bind(meal_id)
        .fetch_optional(pool)
        .await
        .map_err(read_error)?
        .ok_or_else(|| Error::NotFound(format!("Meal {meal_id} not found")))
}

/// Ingredient lines of a meal in slot order
pub async fn get_meal_ingredients(pool: &DbPool, meal_id: i64) -> Result<Vec<IngredientLine>> {
    let lines = sqlx::query_as::<_, IngredientLine>(
        r#"
        SELECT ingredient AS name, measure, position
        FROM meal_ingredients
        WHERE meal_id = ?
        ORDER BY position
        "#,
    )
    .bind(meal_id)
    .fetch_all(pool)
    .await
    .map_err(read_error)?;

    Ok(lines)
}

pub async fn get_meal_details(pool: &DbPool, meal_id: i64) -> Result<MealDetails> {
    let meal = get_meal(pool, meal_id).await?;
    let ingredients = get_meal_ingredients(pool, meal_id).await?;
    Ok(MealDetails { meal, ingredients })
}

pub async fn count_meals(pool: &DbPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM meals")
        .fetch_one(pool)
        .await
        .map_err(read_error)
}

pub async fn count_ingredient_lines(pool: &DbPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM meal_ingredients")
        .fetch_one(pool)
        .await
        .map_err(read_error)
}

pub async fn count_fulltext_rows(pool: &DbPool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM meals_fts")
        .fetch_one(pool)
        .await
        .map_err(read_error)
}

/// Row counts plus the most recent build run
pub async fn index_stats(pool: &DbPool) -> Result<IndexStats> {
    Ok(IndexStats {
        meals: count_meals(pool).await?,
        ingredient_lines: count_ingredient_lines(pool).await?,
        latest_run: runs::latest_run(pool).await?,
    })
}
