use crate::crawler::models::RawMeal;
use crate::crawler::{shard_position, ShardResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Counts gathered while merging shard results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub raw: usize,
    pub unique: usize,
    pub malformed: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    /// One record per id, ascending by id
    pub meals: Vec<RawMeal>,
    pub stats: AggregateStats,
}

/// Merge shard results into one record per id.
///
/// Shards are folded in alphabet order regardless of the order they
/// finished in, so when two shards return the same id the later shard in
/// the alphabet wins.
pub fn aggregate(mut results: Vec<ShardResult>) -> Aggregated {
    results.sort_by_key(|r| shard_position(&r.shard));
    dedup_meals(results.into_iter().flat_map(|r| r.meals))
}

/// Keep the last record seen for each id and sort by id
pub fn dedup_meals(meals: impl IntoIterator<Item = RawMeal>) -> Aggregated {
    let mut stats = AggregateStats::default();
    let mut by_id: BTreeMap<i64, RawMeal> = BTreeMap::new();

    for meal in meals {
        stats.raw += 1;

        let Some(id) = meal.id() else {
            warn!("Dropping meal with unparseable id {}", meal.id_label());
            stats.malformed += 1;
            continue;
        };

        if by_id.insert(id, meal).is_some() {
            debug!("Meal {} returned more than once, keeping the later copy", id);
            stats.duplicates += 1;
        }
    }

    stats.unique = by_id.len();

    Aggregated {
        meals: by_id.into_values().collect(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ShardOutcome;
    use serde_json::json;

    fn meal(id: &str, name: &str) -> RawMeal {
        RawMeal {
            id_meal: Some(json!(id)),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn shard(key: &str, meals: Vec<RawMeal>) -> ShardResult {
        ShardResult {
            shard: key.to_string(),
            meals,
            outcome: ShardOutcome::Fetched,
        }
    }

    #[test]
    fn test_last_shard_wins() {
        let results = vec![
            shard("a", vec![meal("7", "Apple Pie")]),
            shard("g", vec![meal("7", "Golden Pie")]),
        ];

        let aggregated = aggregate(results);
        assert_eq!(aggregated.meals.len(), 1);
        assert_eq!(aggregated.meals[0].name.as_deref(), Some("Golden Pie"));
        assert_eq!(aggregated.stats.duplicates, 1);
    }

    #[test]
    fn test_completion_order_does_not_matter() {
        let forward = vec![
            shard("a", vec![meal("7", "Apple Pie"), meal("3", "Apam")]),
            shard("g", vec![meal("7", "Golden Pie")]),
            shard("1", vec![meal("10", "15-minute Pasta")]),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let a = aggregate(forward);
        let b = aggregate(backward);
        assert_eq!(a.meals, b.meals);
        assert_eq!(a.meals[1].name.as_deref(), Some("Golden Pie"));
    }

    #[test]
    fn test_sorted_numerically_and_malformed_dropped() {
        let results = vec![shard(
            "b",
            vec![
                meal("100", "Beef Wellington"),
                meal("9", "Bread"),
                meal("oops", "Broken"),
                RawMeal::default(),
                meal("52", "Bibimbap"),
            ],
        )];

        let aggregated = aggregate(results);
        let ids: Vec<i64> = aggregated.meals.iter().filter_map(RawMeal::id).collect();
        assert_eq!(ids, vec![9, 52, 100]);
        assert_eq!(
            aggregated.stats,
            AggregateStats {
                raw: 5,
                unique: 3,
                malformed: 2,
                duplicates: 0,
            }
        );
    }

    #[test]
    fn test_empty_input() {
        let aggregated = aggregate(Vec::new());
        assert!(aggregated.meals.is_empty());
        assert_eq!(aggregated.stats, AggregateStats::default());
    }
}
