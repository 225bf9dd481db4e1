use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use birdpipe::blob_store::FsBlobStore;
use birdpipe::classifier::HttpClassifier;
use birdpipe::config::{self, AppConfig};
use birdpipe::jobs;
use birdpipe::survey_store::SqliteSurveyStore;

#[derive(Parser, Debug)]
#[clap(about = "Acoustic bird survey pipeline")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Path to the survey database file. Can also be specified in config file.
    #[clap(long)]
    pub db_path: Option<PathBuf>,

    /// Root directory of the blob store bucket.
    #[clap(long)]
    pub bucket_dir: Option<PathBuf>,

    /// Directory where generated reports are written.
    #[clap(long, default_value = "./out")]
    pub out_dir: PathBuf,

    /// Full URL of the classifier's classify endpoint.
    #[clap(long)]
    pub classify_url: Option<String>,

    /// Timeout in seconds for classifier requests.
    #[clap(long, default_value_t = 60)]
    pub classify_timeout_secs: u64,

    /// Confidence threshold for a positive segment.
    #[clap(long, default_value_t = 0.30)]
    pub positive_threshold: f64,

    /// Directory containing audio files to upload.
    #[clap(long)]
    pub audio_dir: Option<PathBuf>,

    /// Latitude assigned to uploaded recordings.
    #[clap(long)]
    pub audio_lat: Option<f64>,

    /// Longitude assigned to uploaded recordings.
    #[clap(long)]
    pub audio_lon: Option<f64>,

    /// Path to the observation batch file (JSONL).
    #[clap(long)]
    pub observations_path: Option<PathBuf>,

    /// Source tag stored with ingested observations.
    #[clap(long)]
    pub observations_source: Option<String>,

    /// Path to the taxonomy seed file (JSON array).
    #[clap(long)]
    pub taxonomy_path: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the database and blob store accept writes.
    Healthcheck,
    /// Register local audio files in the blob store and database.
    Upload,
    /// Classify registered recordings through the external classifier.
    Classify,
    /// Ingest a field-observation batch file.
    IngestObservations,
    /// Seed the taxonomy table from a species export.
    SeedTaxa,
    /// Generate the per-species report CSV.
    Report {
        /// Fuzzy species filter applied to the report rows.
        #[clap(long)]
        species: Option<String>,

        /// Override the positive-segment confidence threshold.
        #[clap(long)]
        min_score: Option<f64>,

        /// Keep only the first N rows after sorting (0 = all).
        #[clap(long, default_value_t = 0)]
        top_n: usize,
    },
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            bucket_dir: args.bucket_dir.clone(),
            out_dir: args.out_dir.clone(),
            classify_url: args.classify_url.clone(),
            classify_timeout_secs: args.classify_timeout_secs,
            positive_threshold: args.positive_threshold,
            audio_dir: args.audio_dir.clone(),
            audio_lat: args.audio_lat,
            audio_lon: args.audio_lon,
            observations_path: args.observations_path.clone(),
            observations_source: args.observations_source.clone(),
            taxonomy_path: args.taxonomy_path.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    if !app_config.db_path.exists() {
        info!("Creating new survey database at {:?}", app_config.db_path);
    }
    let store = SqliteSurveyStore::open(&app_config.db_path)?;
    let blob = FsBlobStore::new(&app_config.bucket_dir);

    match &cli_args.command {
        Command::Healthcheck => {
            jobs::run_healthcheck(&store, &blob)?;
        }
        Command::Upload => {
            let Some(audio_dir) = &app_config.audio_dir else {
                bail!("upload requires --audio-dir or audio_dir in config file");
            };
            jobs::run_upload(
                &store,
                &blob,
                audio_dir,
                app_config.audio_lat,
                app_config.audio_lon,
            )?;
        }
        Command::Classify => {
            let Some(classify_url) = &app_config.classify_url else {
                bail!("classify requires --classify-url or classify_url in config file");
            };
            let classifier =
                HttpClassifier::new(classify_url.clone(), app_config.classify_timeout_secs)?;
            jobs::run_classify(&store, &blob, &classifier).await?;
        }
        Command::IngestObservations => {
            let Some(batch_path) = &app_config.observations_path else {
                bail!("ingest-observations requires --observations-path or observations_path in config file");
            };
            let source = app_config
                .observations_source
                .as_deref()
                .unwrap_or("field-observations");
            jobs::run_ingest_observations(&store, batch_path, source)?;
        }
        Command::SeedTaxa => {
            let Some(seed_path) = &app_config.taxonomy_path else {
                bail!("seed-taxa requires --taxonomy-path or taxonomy_path in config file");
            };
            jobs::run_seed_taxa(&store, seed_path, "taxonomy-export")?;
        }
        Command::Report {
            species,
            min_score,
            top_n,
        } => {
            let params = jobs::ReportParams {
                threshold: min_score.unwrap_or(app_config.positive_threshold),
                species: species.clone(),
                top_n: *top_n,
            };
            let (path, summary) = jobs::run_report(&store, &app_config.out_dir, &params)?;
            println!("Report: {}", path.display());
            println!("Rows: {} | threshold={}", summary.processed, params.threshold);
        }
    }

    Ok(())
}
