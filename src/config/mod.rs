use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional TOML configuration. Every field mirrors a CLI argument and,
/// when present, takes precedence over it.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub bucket_dir: Option<String>,
    pub out_dir: Option<String>,
    pub classify_url: Option<String>,
    pub classify_timeout_secs: Option<u64>,
    pub positive_threshold: Option<f64>,
    pub audio_dir: Option<String>,
    pub audio_lat: Option<f64>,
    pub audio_lon: Option<f64>,
    pub observations_path: Option<String>,
    pub observations_source: Option<String>,
    pub taxonomy_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub bucket_dir: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub classify_url: Option<String>,
    pub classify_timeout_secs: u64,
    pub positive_threshold: f64,
    pub audio_dir: Option<PathBuf>,
    pub audio_lat: Option<f64>,
    pub audio_lon: Option<f64>,
    pub observations_path: Option<PathBuf>,
    pub observations_source: Option<String>,
    pub taxonomy_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bucket_dir: PathBuf,
    pub out_dir: PathBuf,
    pub classify_url: Option<String>,
    pub classify_timeout_secs: u64,
    pub positive_threshold: f64,
    pub audio_dir: Option<PathBuf>,
    pub audio_lat: Option<f64>,
    pub audio_lon: Option<f64>,
    pub observations_path: Option<PathBuf>,
    pub observations_source: Option<String>,
    pub taxonomy_path: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let bucket_dir = file
            .bucket_dir
            .map(PathBuf::from)
            .or_else(|| cli.bucket_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("bucket_dir must be specified via --bucket-dir or in config file")
            })?;

        let out_dir = file
            .out_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.out_dir.clone());

        let classify_url = file.classify_url.or_else(|| cli.classify_url.clone());

        let classify_timeout_secs = file
            .classify_timeout_secs
            .unwrap_or(cli.classify_timeout_secs);
        if classify_timeout_secs == 0 {
            bail!("classify_timeout_secs must be greater than zero");
        }

        let positive_threshold = file.positive_threshold.unwrap_or(cli.positive_threshold);
        if !(0.0..=1.0).contains(&positive_threshold) {
            bail!(
                "positive_threshold must be within 0.0..=1.0, got {}",
                positive_threshold
            );
        }

        let audio_dir = file
            .audio_dir
            .map(PathBuf::from)
            .or_else(|| cli.audio_dir.clone());
        let audio_lat = file.audio_lat.or(cli.audio_lat);
        let audio_lon = file.audio_lon.or(cli.audio_lon);

        let observations_path = file
            .observations_path
            .map(PathBuf::from)
            .or_else(|| cli.observations_path.clone());
        let observations_source = file
            .observations_source
            .or_else(|| cli.observations_source.clone());

        let taxonomy_path = file
            .taxonomy_path
            .map(PathBuf::from)
            .or_else(|| cli.taxonomy_path.clone());

        Ok(Self {
            db_path,
            bucket_dir,
            out_dir,
            classify_url,
            classify_timeout_secs,
            positive_threshold,
            audio_dir,
            audio_lat,
            audio_lon,
            observations_path,
            observations_source,
            taxonomy_path,
        })
    }
}
