//! Search service for style-code lookup.
//!
//! Coordinates the query encoder, the ranker and the embedding store:
//! - Text search: encode the query, rank the whole store
//! - Similar search: reuse a stored fingerprint, excluding its own code
//! - Hot reload: swap in a freshly loaded store without blocking searches

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::semantic::encoder::{EncoderError, QueryEncoder};
use crate::semantic::ranker::{ExactRanker, RankError, Ranked, Ranker};
use crate::semantic::store::{EmbeddingStore, StoreError};

/// Errors that can occur during search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Query is required")]
    EmptyQuery,

    #[error("SREF code is required")]
    EmptyCode,

    #[error("SREF code {0} not found")]
    NotFound(String),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Rank error: {0}")]
    Rank(#[from] RankError),

    #[error("Encoder {encoder} produces {encoder_dims} dims but the index holds {index_dims}")]
    IncompatibleIndex {
        encoder: String,
        encoder_dims: usize,
        index_dims: usize,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single ranked style code as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "sref_code")]
    pub code: String,
    #[serde(rename = "similarity")]
    pub score: f32,
    pub summary: String,
    pub image_count: usize,
    /// Filenames exactly as recorded in the store
    pub thumbnails: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub combined_captions: String,
}

impl From<Ranked<'_>> for QueryResult {
    fn from(ranked: Ranked<'_>) -> Self {
        Self {
            code: ranked.entry.code.clone(),
            score: ranked.score,
            summary: ranked.entry.summary.clone(),
            image_count: ranked.entry.image_count,
            thumbnails: ranked.entry.thumbnails.clone(),
            combined_captions: ranked.entry.combined_captions.clone(),
        }
    }
}

/// Full ranking for a text query.
#[derive(Debug, Clone)]
pub struct TextSearch {
    /// The trimmed query, echoed back
    pub query: String,
    pub results: Vec<QueryResult>,
}

/// Full ranking relative to a stored style code; the reference is excluded.
#[derive(Debug, Clone)]
pub struct SimilarSearch {
    pub reference: String,
    pub results: Vec<QueryResult>,
}

/// Check that text queries will be comparable with the stored fingerprints.
///
/// Passes when the store is empty or the encoder has not loaded a model yet.
pub fn check_dimensions(
    store: &EmbeddingStore,
    encoder: &dyn QueryEncoder,
) -> Result<(), SearchError> {
    let Some(encoder_dims) = encoder.dimensions() else {
        return Ok(());
    };
    if store.is_empty() || store.dimensions() == encoder_dims {
        return Ok(());
    }

    Err(SearchError::IncompatibleIndex {
        encoder: encoder.name().to_string(),
        encoder_dims,
        index_dims: store.dimensions(),
    })
}

/// Service for ranking style codes.
///
/// The store is held behind `RwLock<Arc<_>>`: searches clone the `Arc` and
/// release the lock before encoding, so a reload only ever swaps the pointer.
pub struct SearchService {
    store: RwLock<Arc<EmbeddingStore>>,
    encoder: Arc<dyn QueryEncoder>,
    ranker: Arc<dyn Ranker>,
}

impl SearchService {
    /// Create a service over `store` using exact cosine ranking.
    pub fn new(store: Arc<EmbeddingStore>, encoder: Arc<dyn QueryEncoder>) -> Self {
        Self {
            store: RwLock::new(store),
            encoder,
            ranker: Arc::new(ExactRanker),
        }
    }

    /// Replace the ranking strategy.
    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = ranker;
        self
    }

    /// Current store snapshot.
    pub fn store(&self) -> Result<Arc<EmbeddingStore>, SearchError> {
        self.store
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|e| SearchError::Internal(format!("Lock poisoned: {}", e)))
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    /// Swap in a new store. In-flight searches keep the snapshot they started with.
    pub fn reload(&self, store: Arc<EmbeddingStore>) -> Result<(), SearchError> {
        let mut guard = self
            .store
            .write()
            .map_err(|e| SearchError::Internal(format!("Lock poisoned: {}", e)))?;
        log::info!("Swapping style index ({} -> {} styles)", guard.len(), store.len());
        *guard = store;
        Ok(())
    }

    /// Rank every style code against a free-text description.
    pub fn search_by_text(&self, query: &str) -> Result<TextSearch, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let store = self.store()?;
        let query_embedding = self.encoder.embed_text(query)?;
        let results = self.rank(&query_embedding, &store, None)?;

        log::debug!("text search {:?}: {} results", query, results.len());

        Ok(TextSearch {
            query: query.to_string(),
            results,
        })
    }

    /// Rank every other style code against the fingerprint of `code`.
    pub fn search_by_code(&self, code: &str) -> Result<SimilarSearch, SearchError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SearchError::EmptyCode);
        }

        let store = self.store()?;
        let reference = store.get(code).map_err(|e| match e {
            StoreError::NotFound(code) => SearchError::NotFound(code),
            other => SearchError::Internal(other.to_string()),
        })?;
        let results = self.rank(&reference.embedding, &store, Some(code))?;

        Ok(SimilarSearch {
            reference: code.to_string(),
            results,
        })
    }

    /// Rank every style code against an image on disk.
    pub fn search_by_image(&self, path: &Path) -> Result<Vec<QueryResult>, SearchError> {
        let store = self.store()?;
        let query_embedding = self.encoder.embed_image(path)?;
        self.rank(&query_embedding, &store, None)
    }

    fn rank(
        &self,
        query: &[f32],
        store: &EmbeddingStore,
        exclude: Option<&str>,
    ) -> Result<Vec<QueryResult>, SearchError> {
        let ranked = self.ranker.rank(query, store, exclude)?;
        Ok(ranked.into_iter().map(QueryResult::from).collect())
    }
}
