//! Curated search tags.
//!
//! Tags come from a human-reviewed JSON file:
//!
//! ```json
//! {
//!   "all_tags": ["painting", "blue", "sky"],
//!   "art_media_styles": ["painting"],
//!   "colors": ["blue"],
//!   "nature_environment": ["sky"],
//!   "descriptive_terms": []
//! }
//! ```
//!
//! Loading never fails: a missing or malformed file yields the built-in list.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default number of tags returned by a random sample
pub const DEFAULT_SAMPLE_SIZE: usize = 12;

const FALLBACK_ART_MEDIA: &[&str] = &["painting", "illustration", "drawing", "poster"];
const FALLBACK_COLORS: &[&str] = &[
    "white", "blue", "black", "red", "green", "pink", "purple", "yellow", "orange", "gold",
];
const FALLBACK_NATURE: &[&str] = &[
    "flowers", "sky", "water", "field", "ocean", "beach", "street", "night", "lights", "air",
    "tree", "snow", "flower", "bird", "cat",
];
const FALLBACK_DESCRIPTIVE: &[&str] = &["close", "colorful", "city", "group", "face", "bunch"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TagCategory {
    #[serde(rename = "art_media_styles")]
    ArtMedia,
    #[serde(rename = "colors")]
    Color,
    #[serde(rename = "nature_environment")]
    NatureEnvironment,
    #[serde(rename = "descriptive_terms")]
    Descriptive,
}

impl TagCategory {
    pub const ALL: [TagCategory; 4] = [
        TagCategory::ArtMedia,
        TagCategory::Color,
        TagCategory::NatureEnvironment,
        TagCategory::Descriptive,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEntry {
    pub term: String,
    pub category: TagCategory,
}

#[derive(Debug, thiserror::Error)]
pub enum TagSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed tag file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tag file contains no tags")]
    Empty,
}

#[derive(Debug, Default, Deserialize)]
struct CuratedTags {
    #[serde(default)]
    all_tags: Vec<String>,
    #[serde(default)]
    art_media_styles: Vec<String>,
    #[serde(default)]
    colors: Vec<String>,
    #[serde(default)]
    nature_environment: Vec<String>,
    #[serde(default)]
    descriptive_terms: Vec<String>,
}

impl CuratedTags {
    fn category_lists(&self) -> [(TagCategory, &[String]); 4] {
        [
            (TagCategory::ArtMedia, self.art_media_styles.as_slice()),
            (TagCategory::Color, self.colors.as_slice()),
            (TagCategory::NatureEnvironment, self.nature_environment.as_slice()),
            (TagCategory::Descriptive, self.descriptive_terms.as_slice()),
        ]
    }

    /// Flatten into ordered entries: `all_tags` order first, then terms that
    /// only appear in a category list.
    fn into_entries(self) -> Vec<TagEntry> {
        let category_of = |term: &str| {
            self.category_lists()
                .into_iter()
                .find(|(_, terms)| terms.iter().any(|t| t.trim() == term))
                .map(|(category, _)| category)
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for term in self.all_tags.iter().map(|t| t.trim()) {
            if term.is_empty() || !seen.insert(term.to_string()) {
                continue;
            }
            let category = category_of(term).unwrap_or_else(|| {
                log::debug!("tag {:?} has no category, treating as descriptive", term);
                TagCategory::Descriptive
            });
            entries.push(TagEntry {
                term: term.to_string(),
                category,
            });
        }

        for (category, terms) in self.category_lists() {
            for term in terms.iter().map(|t| t.trim()) {
                if term.is_empty() || !seen.insert(term.to_string()) {
                    continue;
                }
                entries.push(TagEntry {
                    term: term.to_string(),
                    category,
                });
            }
        }

        entries
    }
}

/// Ordered, categorized search tags.
#[derive(Debug, Clone)]
pub struct TagCatalog {
    tags: Vec<TagEntry>,
    used_fallback: bool,
}

impl TagCatalog {
    /// Load the curated list, falling back to the built-in list on any error.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(catalog) => {
                log::info!("Loaded {} curated tags from {}", catalog.len(), path.display());
                catalog
            }
            Err(err) => {
                log::warn!(
                    "Curated tags unavailable at {} ({}), using built-in list",
                    path.display(),
                    err
                );
                Self::fallback()
            }
        }
    }

    /// Load the curated list, reporting why it could not be used.
    pub fn try_load(path: &Path) -> Result<Self, TagSourceError> {
        let contents = std::fs::read_to_string(path)?;
        let curated: CuratedTags = serde_json::from_str(&contents)?;
        let tags = curated.into_entries();
        if tags.is_empty() {
            return Err(TagSourceError::Empty);
        }

        Ok(Self {
            tags,
            used_fallback: false,
        })
    }

    /// The built-in list, with at least one term per category.
    pub fn fallback() -> Self {
        let lists = [
            (TagCategory::ArtMedia, FALLBACK_ART_MEDIA),
            (TagCategory::Color, FALLBACK_COLORS),
            (TagCategory::NatureEnvironment, FALLBACK_NATURE),
            (TagCategory::Descriptive, FALLBACK_DESCRIPTIVE),
        ];

        let tags = lists
            .into_iter()
            .flat_map(|(category, terms)| {
                terms.iter().map(move |term| TagEntry {
                    term: term.to_string(),
                    category,
                })
            })
            .collect();

        Self {
            tags,
            used_fallback: true,
        }
    }

    /// Whether the built-in list is being served.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn all_tags(&self) -> &[TagEntry] {
        &self.tags
    }

    /// Terms in catalog order.
    pub fn terms(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.term.clone()).collect()
    }

    /// Terms per category. Every category is present, possibly empty.
    pub fn grouped_by_category(&self) -> BTreeMap<TagCategory, Vec<String>> {
        let mut grouped: BTreeMap<TagCategory, Vec<String>> = TagCategory::ALL
            .into_iter()
            .map(|category| (category, Vec::new()))
            .collect();

        for tag in &self.tags {
            grouped.entry(tag.category).or_default().push(tag.term.clone());
        }

        grouped
    }

    /// `n` distinct terms chosen uniformly at random. Asking for more than the
    /// catalog holds returns all of them.
    pub fn sample(&self, n: usize) -> Vec<String> {
        self.sample_with(n, &mut rand::rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<String> {
        self.tags
            .choose_multiple(rng, n)
            .map(|t| t.term.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
