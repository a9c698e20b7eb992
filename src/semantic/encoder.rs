//! Query encoder backed by fastembed's CLIP models.
//!
//! Text and images are embedded into the same vector space so that a typed
//! description can be compared against averaged image fingerprints.
//! - Models are loaded lazily on first use, so commands that only read
//!   stored vectors never download anything
//! - Downloads are cached in the `models/` subdirectory of the base path

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions, TextEmbedding};

/// Default encoder model name
pub const DEFAULT_ENCODER_MODEL: &str = "clip-vit-b-32";

/// Error type for encoder operations
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Turns free text or an image into a vector comparable with stored fingerprints.
pub trait QueryEncoder: Send + Sync {
    /// Model identifier, reported by the health endpoint.
    fn name(&self) -> &str;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EncoderError>;

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, EncoderError>;

    /// Vector length, once the text model has been loaded.
    fn dimensions(&self) -> Option<usize>;
}

/// Describes an image in words. Used only when building the index.
pub trait Captioner: Send + Sync {
    fn caption(&self, path: &Path) -> Result<String, EncoderError>;
}

/// Reads captions written by an external captioning job: `<dir>/<image stem>.txt`.
pub struct SidecarCaptioner {
    dir: PathBuf,
}

impl SidecarCaptioner {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl Captioner for SidecarCaptioner {
    fn caption(&self, path: &Path) -> Result<String, EncoderError> {
        let stem = path.file_stem().ok_or_else(|| {
            EncoderError::EmbeddingFailed(format!("{} has no file name", path.display()))
        })?;
        let mut name = stem.to_os_string();
        name.push(".txt");
        let sidecar = self.dir.join(name);

        let caption = std::fs::read_to_string(&sidecar).map_err(|e| {
            EncoderError::EmbeddingFailed(format!("{}: {}", sidecar.display(), e))
        })?;
        Ok(caption.trim().to_string())
    }
}

/// CLIP encoder. Uses a Mutex per tower because fastembed's embed() requires &mut self.
pub struct ClipEncoder {
    model_name: String,
    models_dir: PathBuf,
    text: Mutex<Option<TextEmbedding>>,
    image: Mutex<Option<ImageEmbedding>>,
    dimensions: OnceLock<usize>,
}

impl ClipEncoder {
    /// Create an encoder for the given model name.
    ///
    /// Nothing is downloaded here; see [`ClipEncoder::preload_text`].
    pub fn new(model_name: &str, cache_dir: &Path) -> Result<Self, EncoderError> {
        Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EncoderError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        Ok(Self {
            model_name: model_name.to_string(),
            models_dir,
            text: Mutex::new(None),
            image: Mutex::new(None),
            dimensions: OnceLock::new(),
        })
    }

    /// Load the text tower eagerly so the first search is not slowed by a download.
    pub fn preload_text(&self) -> Result<(), EncoderError> {
        let mut guard = self.text.lock().map_err(|e| {
            EncoderError::InitFailed(format!("Failed to acquire model lock: {}", e))
        })?;
        if guard.is_none() {
            *guard = Some(self.init_text()?);
        }
        Ok(())
    }

    fn init_text(&self) -> Result<TextEmbedding, EncoderError> {
        log::info!("Loading text model '{}'", self.model_name);
        let (text_model, _) = Self::parse_model_name(&self.model_name)?;
        let options = InitOptions::new(text_model)
            .with_cache_dir(self.models_dir.clone())
            .with_show_download_progress(true);

        let mut model =
            TextEmbedding::try_new(options).map_err(|e| EncoderError::InitFailed(e.to_string()))?;

        let dimensions = Self::measure_dimensions(&mut model)?;
        log::info!("Text model '{}' produces {} dims", self.model_name, dimensions);
        let _ = self.dimensions.set(dimensions);

        Ok(model)
    }

    /// Embed a test string to learn the vector length.
    fn measure_dimensions(model: &mut TextEmbedding) -> Result<usize, EncoderError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EncoderError::InitFailed(format!("Failed to measure dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EncoderError::InitFailed("Model returned no embedding".to_string()))
    }

    fn init_image(&self) -> Result<ImageEmbedding, EncoderError> {
        log::info!("Loading image model '{}'", self.model_name);
        let (_, image_model) = Self::parse_model_name(&self.model_name)?;
        let options = ImageInitOptions::new(image_model)
            .with_cache_dir(self.models_dir.clone())
            .with_show_download_progress(true);

        ImageEmbedding::try_new(options).map_err(|e| EncoderError::InitFailed(e.to_string()))
    }

    /// Parse model name string to the matching fastembed text/image pair.
    fn parse_model_name(
        name: &str,
    ) -> Result<(fastembed::EmbeddingModel, ImageEmbeddingModel), EncoderError> {
        match name.to_lowercase().as_str() {
            "clip-vit-b-32" | "clip-vit-b32" | "clipvitb32" => Ok((
                fastembed::EmbeddingModel::ClipVitB32,
                ImageEmbeddingModel::ClipVitB32,
            )),
            _ => Err(EncoderError::InvalidModel(format!(
                "Unknown model: {}. Supported models: clip-vit-b-32",
                name
            ))),
        }
    }
}

impl QueryEncoder for ClipEncoder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut guard = self.text.lock().map_err(|e| {
            EncoderError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;
        if guard.is_none() {
            *guard = Some(self.init_text()?);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| EncoderError::InitFailed("Text model unavailable".to_string()))?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EncoderError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, EncoderError> {
        let mut guard = self.image.lock().map_err(|e| {
            EncoderError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;
        if guard.is_none() {
            *guard = Some(self.init_image()?);
        }
        let model = guard
            .as_mut()
            .ok_or_else(|| EncoderError::InitFailed("Image model unavailable".to_string()))?;

        let embeddings = model
            .embed(vec![path], None)
            .map_err(|e| EncoderError::EmbeddingFailed(format!("{}: {}", path.display(), e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EmbeddingFailed("No embedding returned".to_string()))
    }
}
