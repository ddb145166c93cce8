// Catalog crawling: per-shard fetches against the remote catalog and the
// merge of their results into one record set.

pub mod dedup;
pub mod fetcher;
pub mod models;

use crate::cache::CacheStore;
use crate::config::CatalogConfig;
use crate::error::Result;
use fetcher::CatalogClient;
use futures::stream::{self, StreamExt};
use models::RawMeal;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shard keys in fetch order: the 26 letters, then the 10 digits
pub const SHARD_KEYS: [&str; 36] = [
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
    "s", "t", "u", "v", "w", "x", "y", "z", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9",
];

/// Position of a shard key in [`SHARD_KEYS`]; unknown keys sort last
pub fn shard_position(shard: &str) -> usize {
    SHARD_KEYS
        .iter()
        .position(|k| *k == shard)
        .unwrap_or(SHARD_KEYS.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardOutcome {
    Fetched,
    /// The shard failed and contributes no records
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ShardResult {
    pub shard: String,
    pub meals: Vec<RawMeal>,
    pub outcome: ShardOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ShardFetchReport {
    /// Results for every shard that was issued, in shard order
    pub results: Vec<ShardResult>,
    /// Shards never issued because the fetch was cancelled
    pub skipped: usize,
}

impl ShardFetchReport {
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ShardOutcome::Failed(_)))
            .count()
    }

    pub fn raw_records(&self) -> usize {
        self.results.iter().map(|r| r.meals.len()).sum()
    }
}

/// Fans shard requests out over the catalog client with bounded concurrency
pub struct Crawler {
    client: CatalogClient,
    concurrency: usize,
}

impl Crawler {
    pub fn new(config: &CatalogConfig, cache: CacheStore) -> Result<Self> {
        Ok(Self {
            client: CatalogClient::new(config, cache)?,
            concurrency: config.fetch_concurrency.max(1),
        })
    }

    /// Fetch one shard; a failure is logged and yields an empty result
    pub async fn fetch_shard(&self, shard: &str) -> ShardResult {
        match self.client.search_by_shard(shard).await {
            Ok(meals) => {
                debug!("Shard {} returned {} meals", shard, meals.len());
                ShardResult {
                    shard: shard.to_string(),
                    meals,
                    outcome: ShardOutcome::Fetched,
                }
            }
            Err(e) => {
                warn!("Failed fetching meals for shard {}: {}", shard, e);
                ShardResult {
                    shard: shard.to_string(),
                    meals: Vec::new(),
                    outcome: ShardOutcome::Failed(e.to_string()),
                }
            }
        }
    }

    /// Fetch every shard in [`SHARD_KEYS`]
    pub async fn fetch_all_shards(&self, cancel: &CancellationToken) -> ShardFetchReport {
        self.fetch_shards(&SHARD_KEYS, cancel).await
    }

    /// Fetch the given shards. Once `cancel` fires no further shard is
    /// issued; shards already in flight run to completion.
    pub async fn fetch_shards(&self, shards: &[&str], cancel: &CancellationToken) -> ShardFetchReport {
        let start = Instant::now();
        info!(
            "Fetching {} shards with concurrency {}",
            shards.len(),
            self.concurrency
        );

        let mut results: Vec<ShardResult> = stream::iter(shards.iter().copied())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|shard| self.fetch_shard(shard))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|r| shard_position(&r.shard));

        let report = ShardFetchReport {
            skipped: shards.len() - results.len(),
            results,
        };

        info!(
            "Fetched {} meals (raw) from {} shards in {:.2}s ({} failed, {} skipped)",
            report.raw_records(),
            report.results.len(),
            start.elapsed().as_secs_f64(),
            report.failed(),
            report.skipped
        );

        report
    }
}
