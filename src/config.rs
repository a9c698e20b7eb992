use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_ENCODER_MODEL, DEFAULT_PAGE_SIZE};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_INDEX_PATH: &str = "sref_analysis/sref_search_index.json";
const DEFAULT_TAGS_PATH: &str = "curated_tags.json";
const DEFAULT_THUMBNAILS_DIR: &str = "static/images";
const DEFAULT_METADATA_PATH: &str = "output_test/metadata.csv";
const DEFAULT_IMAGES_DIR: &str = "output_test";
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
/// Hard cap on a single page, bounds response size
const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Configuration for the query encoder
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Model name for embeddings (e.g., "clip-vit-b-32")
    #[serde(default = "default_encoder_model")]
    pub model: String,

    /// Load the text model at startup instead of on the first search
    #[serde(default = "default_true")]
    pub preload: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_ENCODER_MODEL.to_string(),
            preload: true,
        }
    }
}

fn default_encoder_model() -> String {
    DEFAULT_ENCODER_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Style fingerprint index written by `sref build`
    #[serde(default = "default_index_path")]
    pub index_path: String,
    /// Curated tag list
    #[serde(default = "default_tags_path")]
    pub tags_path: String,
    /// Directory served under /thumbnails
    #[serde(default = "default_thumbnails_dir")]
    pub thumbnails_dir: String,
    /// Metadata table produced by the ingestion job
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,
    /// Directory holding the cropped images named in the metadata table
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
    /// Caption sidecars (`<image stem>.txt`); defaults to `images_dir`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions_dir: Option<String>,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Serve an empty index instead of refusing to start when the index is invalid
    #[serde(default)]
    pub degraded_start: bool,
    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            tags_path: default_tags_path(),
            thumbnails_dir: default_thumbnails_dir(),
            metadata_path: default_metadata_path(),
            images_dir: default_images_dir(),
            captions_dir: None,
            listen: default_listen(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            degraded_start: false,
            encoder: EncoderConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_index_path() -> String {
    DEFAULT_INDEX_PATH.to_string()
}

fn default_tags_path() -> String {
    DEFAULT_TAGS_PATH.to_string()
}

fn default_thumbnails_dir() -> String {
    DEFAULT_THUMBNAILS_DIR.to_string()
}

fn default_metadata_path() -> String {
    DEFAULT_METADATA_PATH.to_string()
}

fn default_images_dir() -> String {
    DEFAULT_IMAGES_DIR.to_string()
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            bail!("default_page_size must be greater than 0");
        }

        if self.max_page_size < self.default_page_size {
            bail!(
                "max_page_size ({}) must not be smaller than default_page_size ({})",
                self.max_page_size,
                self.default_page_size
            );
        }

        self.listen
            .parse::<SocketAddr>()
            .with_context(|| format!("listen must be a socket address, got '{}'", self.listen))?;

        Ok(())
    }

    /// Base directory: `SREF_BASE_PATH`, or `~/.local/share/sref`.
    pub fn base_path_from_env() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("SREF_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = homedir::my_home()
            .map_err(|e| anyhow::anyhow!("failed to resolve home directory: {e:?}"))?
            .context("home directory not found; set SREF_BASE_PATH")?;
        Ok(home.join(".local/share/sref"))
    }

    pub fn load() -> Result<Self> {
        let base_path = Self::base_path_from_env()?;
        Self::load_with(&base_path)
    }

    /// Load `config.yaml` from `base_path`, writing defaults if it does not exist.
    pub fn load_with(base_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            let defaults = serde_yml::to_string(&Self::default())?;
            std::fs::write(&config_path, defaults)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        Ok(config)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured path; relative paths are taken from the base path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.index_path)
    }

    pub fn tags_path(&self) -> PathBuf {
        self.resolve(&self.tags_path)
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.resolve(&self.thumbnails_dir)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.resolve(&self.metadata_path)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.resolve(&self.images_dir)
    }

    pub fn captions_dir(&self) -> PathBuf {
        match &self.captions_dir {
            Some(dir) => self.resolve(dir),
            None => self.images_dir(),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(self.listen.parse()?)
    }
}
