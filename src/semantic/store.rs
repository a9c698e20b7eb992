//! Read-only store of per-style-code fingerprints.
//!
//! File format: JSON, one of
//!
//! - search index: an object keyed by style code
//!   `{"<code>": {"embedding": [..], "summary": "..", "image_count": 10,
//!   "combined_captions": "..", "thumbnails": [..]}}`
//! - analysis list: an array of records carrying the code in `sref_code`
//!
//! `thumbnails` takes precedence over `image_files`. Object key order (or array
//! order) is the store order, which the ranker uses to break score ties.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Errors that can occur while loading or querying the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid index file: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Dimension mismatch for style {code}: expected {expected}, got {got}")]
    DimensionMismatch {
        code: String,
        expected: usize,
        got: usize,
    },

    #[error("Style {0} has an empty embedding")]
    EmptyEmbedding(String),

    #[error("Style {0} has a non-finite embedding value")]
    NonFinite(String),

    #[error("Duplicate style code: {0}")]
    DuplicateCode(String),

    #[error("Style code at position {0} is blank")]
    BlankCode(usize),

    #[error("Style code {0:?} has surrounding whitespace")]
    UntrimmedCode(String),

    #[error("SREF code {0} not found")]
    NotFound(String),
}

/// Fingerprint of one style code.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleEntry {
    pub code: String,
    /// Averaged image embedding
    pub embedding: Vec<f32>,
    /// Theme summary, usually `Key themes: term (n), ...`
    pub summary: String,
    /// Thumbnail filenames in slideshow order
    pub thumbnails: Vec<String>,
    /// Number of source images averaged into the fingerprint
    pub image_count: usize,
    pub combined_captions: String,
}

/// Immutable, validated collection of style fingerprints.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    entries: Vec<StyleEntry>,
    by_code: HashMap<String, usize>,
    dimensions: usize,
}

impl EmbeddingStore {
    /// A store with no entries. Used when serving in degraded mode.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and validate a store from a JSON index file.
    ///
    /// Either every entry loads or the whole operation fails.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let IndexFile(records) = serde_json::from_reader(reader)?;

        let entries = records
            .into_iter()
            .map(|(code, raw)| raw.into_entry(code))
            .collect();

        let store = Self::from_entries(entries)?;
        log::info!(
            "Loaded {} styles ({} dims) from {}",
            store.len(),
            store.dimensions(),
            path.display()
        );
        Ok(store)
    }

    /// Build a store from already-constructed entries, applying the same
    /// validation as [`EmbeddingStore::load`].
    pub fn from_entries(entries: Vec<StyleEntry>) -> Result<Self, StoreError> {
        let mut by_code = HashMap::with_capacity(entries.len());
        let dimensions = entries.first().map(|e| e.embedding.len()).unwrap_or(0);

        for (position, entry) in entries.iter().enumerate() {
            if entry.code.trim().is_empty() {
                return Err(StoreError::BlankCode(position));
            }
            if entry.code.trim() != entry.code {
                return Err(StoreError::UntrimmedCode(entry.code.clone()));
            }
            if entry.embedding.is_empty() {
                return Err(StoreError::EmptyEmbedding(entry.code.clone()));
            }
            if entry.embedding.len() != dimensions {
                return Err(StoreError::DimensionMismatch {
                    code: entry.code.clone(),
                    expected: dimensions,
                    got: entry.embedding.len(),
                });
            }
            if entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::NonFinite(entry.code.clone()));
            }
            if by_code.insert(entry.code.clone(), position).is_some() {
                return Err(StoreError::DuplicateCode(entry.code.clone()));
            }
        }

        Ok(Self {
            entries,
            by_code,
            dimensions,
        })
    }

    /// All entries in store order.
    pub fn all_entries(&self) -> &[StyleEntry] {
        &self.entries
    }

    /// Look up an entry by style code.
    pub fn get(&self, code: &str) -> Result<&StyleEntry, StoreError> {
        self.by_code
            .get(code)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| StoreError::NotFound(code.to_string()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Embedding dimensionality shared by every entry (0 when empty).
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store in search-index form.
    ///
    /// Uses atomic write: temp file in the target directory -> rename
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &SavedIndex(&self.entries))?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        Ok(())
    }
}

/// Style code as written by the analysis step; pandas may emit it as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCode {
    Text(String),
    Number(u64),
}

impl RawCode {
    fn into_string(self) -> String {
        match self {
            RawCode::Text(s) => s,
            RawCode::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    sref_code: Option<RawCode>,
    embedding: Vec<f32>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    image_count: Option<usize>,
    #[serde(default)]
    combined_captions: String,
    #[serde(default)]
    thumbnails: Option<Vec<String>>,
    #[serde(default)]
    image_files: Option<Vec<String>>,
}

impl RawEntry {
    fn into_entry(self, code: String) -> StyleEntry {
        let thumbnails = self.thumbnails.or(self.image_files).unwrap_or_default();
        StyleEntry {
            code,
            embedding: self.embedding,
            summary: self.summary,
            image_count: self.image_count.unwrap_or(thumbnails.len()),
            thumbnails,
            combined_captions: self.combined_captions,
        }
    }
}

/// Index records in file order. Deserialized by hand so that duplicate object
/// keys are kept (and rejected by validation) instead of silently collapsed.
struct IndexFile(Vec<(String, RawEntry)>);

impl<'de> Deserialize<'de> for IndexFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = IndexFile;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by style code or an array of style records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<IndexFile, A::Error> {
                let mut records = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((code, entry)) = map.next_entry::<String, RawEntry>()? {
                    records.push((code, entry));
                }
                Ok(IndexFile(records))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<IndexFile, A::Error> {
                let mut records = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(mut entry) = seq.next_element::<RawEntry>()? {
                    let code = entry
                        .sref_code
                        .take()
                        .ok_or_else(|| de::Error::missing_field("sref_code"))?;
                    records.push((code.into_string(), entry));
                }
                Ok(IndexFile(records))
            }
        }

        deserializer.deserialize_any(IndexVisitor)
    }
}

#[derive(Serialize)]
struct SavedEntry<'a> {
    embedding: &'a [f32],
    summary: &'a str,
    image_count: usize,
    combined_captions: &'a str,
    thumbnails: &'a [String],
}

struct SavedIndex<'a>(&'a [StyleEntry]);

impl Serialize for SavedIndex<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(
                &entry.code,
                &SavedEntry {
                    embedding: &entry.embedding,
                    summary: &entry.summary,
                    image_count: entry.image_count,
                    combined_captions: &entry.combined_captions,
                    thumbnails: &entry.thumbnails,
                },
            )?;
        }
        map.end()
    }
}
