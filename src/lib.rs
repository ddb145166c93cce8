pub mod cache;
pub mod config;
pub mod db;
pub mod error;

// Ingestion
pub mod crawler;
pub mod indexer;

// Query side
pub mod rag;

// Surfaces
pub mod api;
pub mod cli;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
