use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use vidscope_core::{
    AnalysisStore, GeminiClient, GeminiConfig, MediaExtractor, MemoryAnalysisStore,
    MemoryObjectStore, ObjectStore, PgAnalysisStore, S3Config, S3ObjectStore, VidscopeConfig,
};

use vidscope_server::http::{start_http_server, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "vidscope.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Keep analyses and objects in memory instead of PostgreSQL and S3
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match VidscopeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let s3_config = S3Config::from(&config.storage);

    let (store, objects): (Arc<dyn AnalysisStore>, Arc<dyn ObjectStore>) = if args.ephemeral {
        tracing::warn!("Running with in-memory stores; nothing will be persisted");
        let store: Arc<dyn AnalysisStore> = Arc::new(MemoryAnalysisStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new(s3_config.base_url()));
        (store, objects)
    } else {
        if !config.database.is_configured() {
            eprintln!(
                "No database url in {}; set [database] url or run with --ephemeral",
                args.config
            );
            std::process::exit(1);
        }

        let pool = match vidscope_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        if let Err(e) = vidscope_core::db::ensure_schema(&pool).await {
            eprintln!("Failed to prepare database schema: {}", e);
            std::process::exit(1);
        }

        let store: Arc<dyn AnalysisStore> = Arc::new(PgAnalysisStore::new(pool));
        let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(s3_config).await);
        (store, objects)
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Analysis store connected: {}", v),
            Err(e) => {
                println!("❌ Analysis store check failed: {}", e);
                std::process::exit(1);
            }
        }

        match which_ffmpeg(&config.media.ffmpeg_path).await {
            Ok(v) => println!("✅ ffmpeg available: {}", v),
            Err(e) => {
                println!("❌ ffmpeg check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Vidscope health check passed");
        return Ok(());
    }

    let model = match GeminiClient::new(GeminiConfig::new(None, &config.gemini)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create Gemini client: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(model = %config.gemini.model, "Generative backend ready");

    let state = Arc::new(HttpState {
        extractor: MediaExtractor::from(&config.media),
        http_client: reqwest::Client::new(),
        model: Arc::new(model),
        store,
        objects,
        config,
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}

/// Run `ffmpeg -version` and return its first output line.
async fn which_ffmpeg(ffmpeg_path: &str) -> anyhow::Result<String> {
    let output = tokio::process::Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!("{} -version exited with {}", ffmpeg_path, output.status);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}
