use clap::Parser;
use mealrag::{
    api::{handlers::AppState, routes},
    cli::{commands, Cli, Commands},
    config::Settings,
    db,
    rag::RetrievalEngine,
    Error, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mealrag=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::from_env()?;
    settings.validate()?;

    // Handle commands
    match cli.command {
        Commands::Init => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            commands::init(&settings, &cancel).await?;
        }
        Commands::Import { file } => {
            commands::import(&settings, file.as_deref()).await?;
        }
        Commands::Refresh { meal_id } => {
            commands::refresh(&settings, meal_id).await?;
        }
        Commands::List { kind } => {
            commands::list(&settings, kind).await?;
        }
        Commands::Search { query, k } => {
            commands::search(&settings, &query, k).await?;
        }
        Commands::Ask {
            question,
            k,
            delegate,
        } => {
            commands::ask(&settings, &question, k, delegate).await?;
        }
        Commands::Stats => {
            commands::stats(&settings).await?;
        }
        Commands::Serve { port, host } => {
            serve(settings, port, host).await?;
        }
    }

    Ok(())
}

/// Stop issuing new shard fetches on the first Ctrl+C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight fetches");
            cancel.cancel();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

async fn serve(mut settings: Settings, port: Option<u16>, host: Option<String>) -> Result<()> {
    // Override settings with CLI arguments
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(host) = host {
        settings.server.host = host;
    }

    info!("Starting MealDB RAG query server");
    info!("Database: {}", settings.database.url);

    // Initialize database with connection pooling configuration
    let pool = db::open_index(&settings.database).await?;
    info!(
        "Database ready (max_connections: {})",
        settings.database.max_connections
    );

    let engine = RetrievalEngine::from_settings(pool.clone(), &settings)?;
    let state = AppState {
        pool,
        engine,
        default_k: settings.retrieval.default_k,
    };
    let app = routes::create_router(state);

    // Start server
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    println!("\n========================================");
    println!("MealDB RAG Query Server");
    println!("========================================");
    println!("Address: http://{addr}");
    println!("\nAPI Endpoints:");
    println!("  GET  /api/search?q=&k=");
    println!("  GET  /api/meals/:id");
    println!("  POST /api/ask");
    println!("  GET  /api/stats");
    println!("\nPress Ctrl+C to stop");
    println!("========================================\n");

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("Server error: {e}")))?;

    Ok(())
}
