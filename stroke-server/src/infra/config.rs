use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use stroke_core::auth::{DEFAULT_GUEST_PASSWORD, DEFAULT_SESSION_TTL_DAYS};
use stroke_core::thumbnails::job_spec::DEFAULT_THUMBNAIL_IMAGE;

/// Server configuration loaded via environment variables (and optionally a
/// thumbnail worker config file).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    /// PostgreSQL connection string. Without one the catalog lives in memory.
    pub database_url: Option<String>,

    // Storage
    pub assetstore_dir: PathBuf,
    pub job_work_dir: PathBuf,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,

    // Authentication
    pub session_ttl_days: i64,
    pub guest_password: String,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let thumbnails = ThumbnailConfig::load_from_env()?;

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8080)?,

            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),

            assetstore_dir: env::var("ASSETSTORE_DIR")
                .unwrap_or_else(|_| "./data/assetstore".to_string())
                .into(),
            job_work_dir: env::var("JOB_WORK_DIR")
                .unwrap_or_else(|_| "./data/jobs".to_string())
                .into(),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:8080,http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            session_ttl_days: parse_var("SESSION_TTL_DAYS", DEFAULT_SESSION_TTL_DAYS)?,
            guest_password: env::var("GUEST_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_GUEST_PASSWORD.to_string()),

            thumbnails,
        })
    }

    /// A configuration rooted at `dir`, with the in-memory store. Used by
    /// tests and local experiments.
    pub fn ephemeral(dir: &Path) -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            database_url: None,
            assetstore_dir: dir.join("assetstore"),
            job_work_dir: dir.join("jobs"),
            cors_allowed_origins: Vec::new(),
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            guest_password: DEFAULT_GUEST_PASSWORD.to_string(),
            thumbnails: ThumbnailConfig::default(),
        }
    }

    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.assetstore_dir).with_context(|| {
            format!("failed to create asset store {}", self.assetstore_dir.display())
        })?;
        fs::create_dir_all(&self.job_work_dir).with_context(|| {
            format!("failed to create job directory {}", self.job_work_dir.display())
        })?;
        Ok(())
    }

    /// Canonicalize storage directories so job volume mounts always get
    /// absolute host paths. Call after `ensure_directories`.
    pub fn normalize_paths(&mut self) -> anyhow::Result<()> {
        self.assetstore_dir = fs::canonicalize(&self.assetstore_dir)?;
        self.job_work_dir = fs::canonicalize(&self.job_work_dir)?;
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {name}={raw}: {err}")),
        _ => Ok(default),
    }
}

/// Thumbnail worker settings: which image renders thumbnails, how it is
/// started, and how many jobs may run at once.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// `docker` binary used to start containers.
    pub docker_path: PathBuf,
    pub image: String,
    /// Concurrent container jobs. Further jobs stay `queued`.
    pub max_concurrent_jobs: usize,
    /// Finished jobs are forgotten after this many hours.
    pub job_retention_hours: i64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            docker_path: PathBuf::from("docker"),
            image: DEFAULT_THUMBNAIL_IMAGE.to_string(),
            max_concurrent_jobs: 2,
            job_retention_hours: 24,
        }
    }
}

impl ThumbnailConfig {
    /// Evaluation order: `$STROKE_CONFIG_PATH`, then `stroke.toml` or
    /// `config/stroke.toml`, then defaults. Environment variables override
    /// individual keys afterwards.
    fn load_from_env() -> anyhow::Result<Self> {
        let mut config = if let Ok(path) = env::var("STROKE_CONFIG_PATH") {
            Self::load_from_file(Path::new(&path))?
        } else if let Some(path) = Self::find_default_file() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        if let Ok(path) = env::var("DOCKER_PATH") {
            config.docker_path = path.into();
        }
        if let Ok(image) = env::var("THUMBNAIL_IMAGE") {
            config.image = image;
        }
        config.max_concurrent_jobs = parse_var("MAX_CONCURRENT_JOBS", config.max_concurrent_jobs)?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse a config file; the worker settings live under `[thumbnails]`.
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct File {
            #[serde(default)]
            thumbnails: ThumbnailConfig,
        }

        let file: File = toml::from_str(contents).map_err(|err| anyhow!("{err}"))?;
        Ok(file.thumbnails)
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &["stroke.toml", "config/stroke.toml"];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}
