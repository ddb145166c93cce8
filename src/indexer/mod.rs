// Index builds: fetch every shard, merge, write the snapshot and the index

pub mod search;

pub use search::{match_expression, sanitize_query, SearchIndex};

use crate::cache::CacheStore;
use crate::config::{IndexConfig, Settings};
use crate::crawler::dedup::{self, Aggregated};
use crate::crawler::fetcher::CatalogClient;
use crate::crawler::models::{MealsEnvelope, RawMeal};
use crate::crawler::{Crawler, SHARD_KEYS};
use crate::db::models::{BuildCounts, Meal};
use crate::db::{self, meals, runs, DbPool};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Summary of one build or snapshot import
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub run_id: i64,
    pub shards_total: usize,
    pub shards_failed: usize,
    pub records_fetched: usize,
    pub records_unique: usize,
    pub records_malformed: usize,
    pub records_indexed: usize,
    pub snapshot_path: Option<PathBuf>,
    pub elapsed_seconds: f64,
}

impl BuildReport {
    fn counts(&self) -> BuildCounts {
        BuildCounts {
            shards_failed: self.shards_failed as i64,
            records_fetched: self.records_fetched as i64,
            records_unique: self.records_unique as i64,
            records_indexed: self.records_indexed as i64,
        }
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build run #{}", self.run_id)?;
        if self.shards_total > 0 {
            writeln!(
                f,
                "  Shards:    {} fetched, {} failed",
                self.shards_total - self.shards_failed,
                self.shards_failed
            )?;
        }
        writeln!(
            f,
            "  Records:   {} raw, {} unique, {} malformed",
            self.records_fetched, self.records_unique, self.records_malformed
        )?;
        writeln!(f, "  Indexed:   {}", self.records_indexed)?;
        if let Some(path) = &self.snapshot_path {
            writeln!(f, "  Snapshot:  {}", path.display())?;
        }
        write!(f, "  Took:      {:.2}s", self.elapsed_seconds)
    }
}

/// Build or refresh the index from the remote catalog.
///
/// Safe to re-run: every record is upserted by id and rows carry no write
/// timestamps, so a second run over the same catalog leaves the index
/// byte-for-byte unchanged.
pub async fn build_index(settings: &Settings, cancel: &CancellationToken) -> Result<BuildReport> {
    let pool = db::open_index(&settings.database).await?;
    let crawler = Crawler::new(&settings.catalog, CacheStore::from_config(&settings.cache))?;
    build_with(&pool, &crawler, &settings.index, cancel).await
}

/// Build using an already opened pool and crawler
pub async fn build_with(
    pool: &DbPool,
    crawler: &Crawler,
    config: &IndexConfig,
    cancel: &CancellationToken,
) -> Result<BuildReport> {
    let run_id = runs::start_run(pool, SHARD_KEYS.len()).await?;
    info!("Starting index build (run #{})", run_id);

    let result = run_build(pool, crawler, config, cancel, run_id).await;
    finish_run(pool, run_id, result).await
}

async fn run_build(
    pool: &DbPool,
    crawler: &Crawler,
    config: &IndexConfig,
    cancel: &CancellationToken,
    run_id: i64,
) -> Result<BuildReport> {
    let start = Instant::now();

    let fetched = crawler.fetch_all_shards(cancel).await;
    if cancel.is_cancelled() {
        warn!(
            "Build cancelled after {} shards, nothing written",
            fetched.results.len()
        );
        return Err(Error::Cancelled);
    }

    let shards_failed = fetched.failed();
    let Aggregated { meals: records, stats } = dedup::aggregate(fetched.results);
    info!(
        "Aggregated {} unique meals from {} raw records ({} duplicates, {} malformed)",
        stats.unique, stats.raw, stats.duplicates, stats.malformed
    );

    let snapshot_path = match write_snapshot(&config.snapshot_path, &records).await {
        Ok(()) => Some(config.snapshot_path.clone()),
        Err(e) => {
            error!(
                "Failed writing snapshot {:?}: {}",
                config.snapshot_path,
                e.log_safe()
            );
            None
        }
    };

    let records_indexed = meals::upsert_meals(pool, &records, config.batch_size).await?;

    Ok(BuildReport {
        run_id,
        shards_total: SHARD_KEYS.len(),
        shards_failed,
        records_fetched: stats.raw,
        records_unique: stats.unique,
        records_malformed: stats.malformed,
        records_indexed,
        snapshot_path,
        elapsed_seconds: start.elapsed().as_secs_f64(),
    })
}

/// Record the outcome of a build on its run row
async fn finish_run(
    pool: &DbPool,
    run_id: i64,
    result: Result<BuildReport>,
) -> Result<BuildReport> {
    match result {
        Ok(report) => {
            runs::complete_run(pool, run_id, &report.counts()).await?;
            info!(
                "Build #{} completed: {} meals indexed in {:.2}s",
                run_id, report.records_indexed, report.elapsed_seconds
            );
            Ok(report)
        }
        Err(e) => {
            error!("Build #{} failed: {}", run_id, e.log_safe());
            if let Err(mark_err) = runs::fail_run(pool, run_id, &e.to_string()).await {
                error!(
                    "Failed to record failure of build #{}: {}",
                    run_id,
                    mark_err.log_safe()
                );
            }
            Err(e)
        }
    }
}

/// Index the records of a snapshot file without touching the network
pub async fn import_snapshot(pool: &DbPool, path: &Path, batch_size: usize) -> Result<BuildReport> {
    let run_id = runs::start_run(pool, 0).await?;
    info!("Importing snapshot {:?} (run #{})", path, run_id);

    let result = async {
        let start = Instant::now();
        let Aggregated { meals: records, stats } = dedup::dedup_meals(read_snapshot(path).await?);
        let records_indexed = meals::upsert_meals(pool, &records, batch_size).await?;

        Ok::<_, Error>(BuildReport {
            run_id,
            shards_total: 0,
            shards_failed: 0,
            records_fetched: stats.raw,
            records_unique: stats.unique,
            records_malformed: stats.malformed,
            records_indexed,
            snapshot_path: Some(path.to_path_buf()),
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }
    .await;

    finish_run(pool, run_id, result).await
}

/// Fetch one meal by id and upsert it. `None` when the catalog has no such meal.
pub async fn refresh_meal(
    pool: &DbPool,
    client: &CatalogClient,
    meal_id: i64,
) -> Result<Option<Meal>> {
    let Some(raw) = client.lookup_by_id(meal_id).await? else {
        return Ok(None);
    };

    if raw.id() != Some(meal_id) {
        return Err(Error::Catalog(format!(
            "Lookup for meal {meal_id} returned id {}",
            raw.id_label()
        )));
    }

    meals::upsert_meals(pool, std::slice::from_ref(&raw), 1).await?;
    Ok(Some(meals::get_meal(pool, meal_id).await?))
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    meals: &'a [RawMeal],
}

/// Write `{"meals": [...]}` next to the index, replacing any older snapshot
pub async fn write_snapshot(path: &Path, meals: &[RawMeal]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let body = serde_json::to_vec(&SnapshotRef { meals })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &body).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!("Wrote {} meals to {:?}", meals.len(), path);
    Ok(())
}

pub async fn read_snapshot(path: &Path) -> Result<Vec<RawMeal>> {
    let body = tokio::fs::read_to_string(path).await?;
    let envelope: MealsEnvelope = serde_json::from_str(&body)?;
    Ok(envelope.meals.unwrap_or_default())
}
