//! Offline index builder.
//!
//! Turns the ingestion job's metadata table into a fingerprint store:
//! 1. Group image rows by style code (first-appearance order)
//! 2. Embed every image that exists on disk
//! 3. Average the embeddings into one fingerprint per code
//! 4. Caption every image and summarize the captions
//!
//! Metadata columns: `sref, filename, page, row, col[, caption]`. A non-empty
//! `caption` cell takes precedence over the captioner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use crate::semantic::fingerprint;
use crate::semantic::themes::summarize_captions;
use crate::semantic::{Captioner, EmbeddingStore, QueryEncoder, StoreError, StyleEntry};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Metadata error: {0}")]
    Metadata(#[from] csv::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No style code produced a fingerprint")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    sref: String,
    filename: String,
    #[serde(default)]
    caption: Option<String>,
}

/// One image of a style group.
#[derive(Debug, Clone)]
pub struct GroupImage {
    pub filename: String,
    pub path: PathBuf,
    pub caption: Option<String>,
}

/// All images recorded for one style code.
#[derive(Debug, Clone)]
pub struct StyleGroup {
    pub code: String,
    pub images: Vec<GroupImage>,
}

/// Read the metadata table and group rows by style code.
///
/// Rows whose image file is missing are skipped with a warning.
pub fn read_groups(metadata_path: &Path, images_dir: &Path) -> Result<Vec<StyleGroup>, BuildError> {
    let mut reader = csv::Reader::from_path(metadata_path)?;

    let mut groups: Vec<StyleGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rows = 0usize;

    for row in reader.deserialize::<MetadataRow>() {
        let row = row?;
        rows += 1;

        let code = row.sref.trim().to_string();
        let path = images_dir.join(&row.filename);
        if code.is_empty() {
            log::warn!("Skipping {}: row has no style code", row.filename);
            continue;
        }
        if !path.is_file() {
            log::warn!("Image file not found: {}", path.display());
            continue;
        }

        let idx = *positions.entry(code.clone()).or_insert_with(|| {
            groups.push(StyleGroup {
                code,
                images: Vec::new(),
            });
            groups.len() - 1
        });

        groups[idx].images.push(GroupImage {
            filename: row.filename,
            path,
            caption: row.caption.filter(|c| !c.trim().is_empty()),
        });
    }

    log::info!("Grouped {} rows into {} style codes", rows, groups.len());
    Ok(groups)
}

/// Caption for one image: the metadata cell if present, else the captioner.
fn caption_for(captioner: Option<&dyn Captioner>, image: &GroupImage) -> Option<String> {
    if let Some(caption) = &image.caption {
        return Some(caption.clone());
    }

    match captioner?.caption(&image.path) {
        Ok(caption) if !caption.is_empty() => Some(caption),
        Ok(_) => None,
        Err(err) => {
            log::debug!("No caption for {}: {}", image.path.display(), err);
            None
        }
    }
}

/// Embed and summarize one group. Returns `None` if no image could be embedded.
pub fn fingerprint_group(
    encoder: &dyn QueryEncoder,
    captioner: Option<&dyn Captioner>,
    group: &StyleGroup,
) -> Option<StyleEntry> {
    let embeddings: Vec<Vec<f32>> = group
        .images
        .iter()
        .filter_map(|image| match encoder.embed_image(&image.path) {
            Ok(embedding) => Some(embedding),
            Err(err) => {
                log::warn!("Error processing {}: {}", image.path.display(), err);
                None
            }
        })
        .collect();

    let Some(embedding) = fingerprint::average(&embeddings) else {
        log::warn!("No valid embeddings for SREF {}", group.code);
        return None;
    };

    let combined_captions = group
        .images
        .iter()
        .filter_map(|image| caption_for(captioner, image))
        .collect::<Vec<_>>()
        .join(" ");

    Some(StyleEntry {
        code: group.code.clone(),
        embedding,
        summary: summarize_captions(&combined_captions),
        thumbnails: group.images.iter().map(|i| i.filename.clone()).collect(),
        image_count: group.images.len(),
        combined_captions,
    })
}

/// Build a store from the metadata table.
pub fn build_index(
    encoder: &dyn QueryEncoder,
    captioner: Option<&dyn Captioner>,
    metadata_path: &Path,
    images_dir: &Path,
    show_progress: bool,
) -> Result<EmbeddingStore, BuildError> {
    let groups = read_groups(metadata_path, images_dir)?;

    let bar = if show_progress {
        ProgressBar::new(groups.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Analyzing SREF {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    };

    let mut entries = Vec::with_capacity(groups.len());
    for group in &groups {
        bar.set_message(group.code.clone());
        if let Some(entry) = fingerprint_group(encoder, captioner, group) {
            entries.push(entry);
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if entries.is_empty() {
        return Err(BuildError::Empty);
    }

    log::info!("Successfully analyzed {} SREF styles", entries.len());
    Ok(EmbeddingStore::from_entries(entries)?)
}
