use crate::cache::CacheStore;
use crate::config::Settings;
use crate::crawler::fetcher::CatalogClient;
use crate::crawler::models::ListKind;
use crate::db;
use crate::indexer::{self, BuildReport};
use crate::rag::{ContextRecord, Retrieval, RetrievalEngine};
use crate::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Build the index from the remote catalog
pub async fn init(settings: &Settings, cancel: &CancellationToken) -> Result<()> {
    let report = indexer::build_index(settings, cancel).await?;
    print_report("Index built", &report);
    Ok(())
}

/// Index a snapshot file
pub async fn import(settings: &Settings, file: Option<&Path>) -> Result<()> {
    let path = file.unwrap_or(settings.index.snapshot_path.as_path());
    let pool = db::open_index(&settings.database).await?;

    let report = indexer::import_snapshot(&pool, path, settings.index.batch_size).await?;
    print_report("Snapshot imported", &report);
    Ok(())
}

/// Re-fetch and upsert one meal
pub async fn refresh(settings: &Settings, meal_id: i64) -> Result<()> {
    let pool = db::open_index(&settings.database).await?;
    let client = CatalogClient::new(&settings.catalog, CacheStore::from_config(&settings.cache))?;

    match indexer::refresh_meal(&pool, &client, meal_id).await? {
        Some(meal) => println!("\x1b[32m\u{2713}\x1b[0m Refreshed #{} {}", meal.id, meal.name),
        None => println!("Meal {meal_id} not found in the catalog"),
    }
    Ok(())
}

/// Print a basic list from the catalog
pub async fn list(settings: &Settings, kind: ListKind) -> Result<()> {
    let client = CatalogClient::new(&settings.catalog, CacheStore::from_config(&settings.cache))?;
    let names = client.list_basic(kind).await?;

    println!("\n{} {}:\n", names.len(), kind);
    for name in &names {
        println!("  {name}");
    }
    Ok(())
}

/// Search the local index
pub async fn search(settings: &Settings, query: &str, k: Option<usize>) -> Result<()> {
    let engine = open_engine(settings).await?;
    let retrieval = engine
        .retrieve(query, k.unwrap_or(settings.retrieval.default_k))
        .await?;

    print_search_results(&retrieval);
    Ok(())
}

/// Answer a question from the local index
pub async fn ask(
    settings: &Settings,
    question: &str,
    k: Option<usize>,
    delegate: bool,
) -> Result<()> {
    let engine = open_engine(settings).await?;
    let answer = engine
        .answer(question, k.unwrap_or(settings.retrieval.default_k), delegate)
        .await?;

    println!("{answer}");
    Ok(())
}

/// Print index statistics
pub async fn stats(settings: &Settings) -> Result<()> {
    let pool = db::open_existing(&settings.database).await?;
    let stats = db::meals::index_stats(&pool).await?;

    println!("\nMeals:             {}", stats.meals);
    println!("Ingredient lines:  {}", stats.ingredient_lines);

    match stats.latest_run {
        Some(run) => {
            println!("\nLatest build #{} ({})", run.id, run.status);
            println!("  Started:   {}", run.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(completed) = run.completed_at {
                println!("  Finished:  {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!(
                "  Shards:    {} total, {} failed",
                run.shards_total, run.shards_failed
            );
            println!(
                "  Records:   {} fetched, {} unique, {} indexed",
                run.records_fetched, run.records_unique, run.records_indexed
            );
            if let Some(message) = run.error_message {
                println!("  Error:     {message}");
            }
        }
        None => println!("\nNo builds recorded yet. Run: mealrag init"),
    }
    Ok(())
}

async fn open_engine(settings: &Settings) -> Result<RetrievalEngine> {
    let pool = db::open_existing(&settings.database).await?;
    let engine = RetrievalEngine::from_settings(pool, settings)?;
    info!(
        "Retrieval engine ready (answer service {})",
        if engine.delegate().is_available() {
            "available"
        } else {
            "unavailable"
        }
    );
    Ok(engine)
}

fn print_report(title: &str, report: &BuildReport) {
    println!("\x1b[32m\u{2713}\x1b[0m {title}");
    println!("{report}");
}

fn print_search_results(retrieval: &Retrieval) {
    let contexts = match retrieval {
        Retrieval::NoResults => {
            println!("No meals found");
            return;
        }
        Retrieval::Found(contexts) => contexts,
    };

    println!("\nFound {} meals:\n", contexts.len());
    println!("{:<7} {:<40} {:<15} {:<12} {:>8}", "ID", "Name", "Category", "Area", "Score");
    println!("{}", "-".repeat(86));

    for context in contexts {
        print_row(context);
    }

    println!("\nFor details: mealrag ask \"<question>\"");
}

fn print_row(context: &ContextRecord) {
    println!(
        "{:<7} {:<40} {:<15} {:<12} {:>8.3}",
        context.id,
        truncate(&context.name, 38),
        truncate(context.category.as_deref().unwrap_or("-"), 13),
        truncate(context.area.as_deref().unwrap_or("-"), 10),
        context.score
    );
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
