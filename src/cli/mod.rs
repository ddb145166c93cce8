// Command-line interface

pub mod commands;

use crate::crawler::models::ListKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mealrag")]
#[command(
    about = "MealDB RAG - build a local meal index and answer questions from cached data",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every shard of the catalog and build the local index
    Init,

    /// Index a previously written snapshot without network access
    Import {
        /// Snapshot file (defaults to SNAPSHOT_PATH)
        file: Option<PathBuf>,
    },

    /// Re-fetch one meal by id and update the index
    Refresh {
        /// Meal ID
        meal_id: i64,
    },

    /// List catalog categories, areas or ingredients
    List {
        /// categories, areas or ingredients
        kind: ListKind,
    },

    /// Search the local index
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Ask a question answered from the local index
    Ask {
        /// Your question in natural language
        question: String,

        /// Number of contexts to retrieve
        #[arg(short, long)]
        k: Option<usize>,

        /// Hand the question to the configured answer service
        #[arg(long)]
        delegate: bool,
    },

    /// Show index statistics and the latest build
    Stats,

    /// Start the query API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },
}
