mod builder;
mod startup;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::semantic::{Captioner, EmbeddingStore, EncoderError, QueryEncoder, StyleEntry};

/// Encoder with canned vectors, keyed by query text or image file name.
#[derive(Default)]
pub struct StubEncoder {
    texts: HashMap<String, Vec<f32>>,
    images: HashMap<String, Vec<f32>>,
    dimensions: Option<usize>,
    calls: AtomicUsize,
}

impl StubEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.texts.insert(text.to_string(), vector);
        self
    }

    pub fn with_image(mut self, file_name: &str, vector: Vec<f32>) -> Self {
        self.images.insert(file_name.to_string(), vector);
        self
    }

    /// Report a loaded model of this width.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueryEncoder for StubEncoder {
    fn name(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts
            .get(text)
            .cloned()
            .ok_or_else(|| EncoderError::EmbeddingFailed(format!("no vector for {text:?}")))
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, EncoderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.images
            .get(&name)
            .cloned()
            .ok_or_else(|| EncoderError::EmbeddingFailed(format!("cannot decode {name}")))
    }
}

/// Encoder that always fails, as if the model could not be loaded.
pub struct FailingEncoder;

impl QueryEncoder for FailingEncoder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn embed_text(&self, _text: &str) -> Result<Vec<f32>, EncoderError> {
        Err(EncoderError::InitFailed(
            "onnx session at /secret/models/clip could not be created".to_string(),
        ))
    }

    fn embed_image(&self, _path: &Path) -> Result<Vec<f32>, EncoderError> {
        Err(EncoderError::InitFailed("image model unavailable".to_string()))
    }
}

/// Captions keyed by image file name; anything else is an error.
#[derive(Default)]
pub struct StubCaptioner {
    captions: HashMap<String, String>,
}

impl StubCaptioner {
    pub fn with_caption(mut self, file_name: &str, caption: &str) -> Self {
        self.captions.insert(file_name.to_string(), caption.to_string());
        self
    }
}

impl Captioner for StubCaptioner {
    fn caption(&self, path: &Path) -> Result<String, EncoderError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.captions
            .get(&name)
            .cloned()
            .ok_or_else(|| EncoderError::EmbeddingFailed(format!("no caption for {name}")))
    }
}

pub fn entry(code: &str, embedding: Vec<f32>) -> StyleEntry {
    StyleEntry {
        code: code.to_string(),
        embedding,
        summary: format!("Key themes: {code} (2)"),
        thumbnails: vec![format!("{code}_0.png"), format!("{code}_1.png")],
        image_count: 2,
        combined_captions: String::new(),
    }
}

/// A={1,0}, B={0,1}, C={1,1}
pub fn abc_store() -> EmbeddingStore {
    EmbeddingStore::from_entries(vec![
        entry("A", vec![1.0, 0.0]),
        entry("B", vec![0.0, 1.0]),
        entry("C", vec![1.0, 1.0]),
    ])
    .unwrap()
}
