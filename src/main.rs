use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;

use chartline::analysis;
use chartline::api::{self, AppState};
use chartline::cache::ResultCache;
use chartline::catalog::{CatalogClient, SpotifyCatalog};
use chartline::config::Config;
use chartline::logger;
use chartline::orchestrator::{self, Orchestrator, RunOutcome};
use chartline::query::ChartStore;

#[derive(Parser)]
#[command(name = "chartline", version, about = "Enrich weekly streaming charts with catalog metadata")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enrich chart files (every CSV under the input directory by default)
    Enrich {
        files: Vec<PathBuf>,
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        no_progress: bool,
    },
    /// Serve the enriched charts over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        charts_dir: Option<PathBuf>,
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Report where a song is popular
    Analyze {
        #[arg(long)]
        track: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        charts_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    let multi = logger::init(config.log_level)?;

    match cli.command {
        Command::Enrich {
            files,
            input_dir,
            output_dir,
            cache,
            concurrency,
            no_progress,
        } => {
            config.input_dir = input_dir.unwrap_or(config.input_dir);
            config.output_dir = output_dir.unwrap_or(config.output_dir);
            config.cache_path = cache.unwrap_or(config.cache_path);
            config.concurrency = concurrency.filter(|&n| n > 0).unwrap_or(config.concurrency);
            config.show_progress &= !no_progress;

            if !config.has_credentials() {
                bail!("CLIENT_ID and CLIENT_SECRET must be set to enrich charts");
            }

            let files = if files.is_empty() {
                orchestrator::discover_inputs(&config.input_dir).with_context(|| {
                    format!("could not list {}", config.input_dir.display())
                })?
            } else {
                files
            };

            let catalog = SpotifyCatalog::new(
                &config.catalog_api_url,
                &config.catalog_auth_url,
                config.client_id.clone(),
                config.client_secret.clone(),
            )?;
            let cache = ResultCache::load(config.cache_path.clone()).await?;
            info!(
                "Loaded cache with {} tracks, {} artists",
                cache.track_count(),
                cache.artist_count()
            );

            let mut orchestrator = Orchestrator::new(
                Arc::new(cache),
                CatalogClient::new(Arc::new(catalog)),
                config.concurrency,
                config.input_dir.clone(),
                config.output_dir.clone(),
            );
            if config.show_progress {
                orchestrator = orchestrator.with_progress(multi);
            }

            let summary = orchestrator.run(&files).await;
            match summary.outcome() {
                RunOutcome::Failed => Ok(ExitCode::FAILURE),
                RunOutcome::NothingToDo => {
                    info!("No chart files found in {}", config.input_dir.display());
                    Ok(ExitCode::SUCCESS)
                }
                RunOutcome::Complete | RunOutcome::Partial => Ok(ExitCode::SUCCESS),
            }
        }
        Command::Serve {
            host,
            port,
            charts_dir,
            static_dir,
        } => {
            config.api_host = host.unwrap_or(config.api_host);
            config.api_port = port.unwrap_or(config.api_port);
            config.static_dir = static_dir.unwrap_or(config.static_dir);
            let charts_dir = charts_dir.unwrap_or_else(|| config.output_dir.clone());

            let store = ChartStore::load(charts_dir).await?;
            let app = api::create_router(AppState::new(store), &config.static_dir);

            let address = config.bind_address();
            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .with_context(|| format!("could not bind {}", address))?;
            info!("Listening on {}", address);
            axum::serve(listener, app).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze {
            track,
            artist,
            charts_dir,
        } => {
            let store = ChartStore::load(charts_dir.unwrap_or(config.output_dir)).await?;
            let report = analysis::analyze(&store, &track, &artist)?;
            println!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
    }
}
