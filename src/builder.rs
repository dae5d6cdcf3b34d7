//! Batch construction of the embedding database from per-identity image
//! folders.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::DynamicImage;
use log::{debug, info, warn};

use lookalike_vision::Detector;

use crate::extract::Represent;
use crate::normalize;
use crate::store::{EmbeddingRecord, EmbeddingStore};

/// Extensions admitted into the per-identity candidate list.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// Of the recognized extensions, only these are actually embedded; bmp and
/// gif candidates occupy cap slots but are skipped.
const EMBEDDED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub const DEFAULT_PER_IDENTITY_CAP: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Identities committed with at least one embedding.
    pub identities_processed: usize,
    pub images_embedded: usize,
    pub images_failed: usize,
}

/// Walk the immediate subdirectories of `root` (each one an identity
/// label), embed up to `per_identity_cap` images per identity and return
/// the accumulated store together with success/failure counters.
///
/// Per-image failures are logged and counted, never fatal. Identities with
/// zero successes are dropped.
pub fn build(
    extractor: &mut impl Represent,
    root: &Path,
    per_identity_cap: usize,
) -> Result<(EmbeddingStore, BuildStats)> {
    let mut store = EmbeddingStore::new();
    let mut stats = BuildStats::default();

    let mut identities: Vec<std::fs::DirEntry> = std::fs::read_dir(root)
        .with_context(|| format!("reading reference directory {}", root.display()))?
        .collect::<std::io::Result<_>>()?;
    // Lexicographic order keeps builds reproducible regardless of how the
    // filesystem enumerates entries.
    identities.sort_by_key(|entry| entry.file_name());

    for entry in identities {
        let path = entry.path();
        if !path.is_dir() {
            info!("skipping {} (not a directory)", path.display());
            continue;
        }
        let label = entry.file_name().to_string_lossy().into_owned();
        info!("processing identity: {}", label);

        let records = embed_identity_dir(extractor, &path, per_identity_cap, &mut stats)?;
        if records.is_empty() {
            warn!("no embeddings extracted for {}", label);
        } else {
            info!("added {} embedding(s) for {}", records.len(), label);
            store.insert(label, records);
            stats.identities_processed += 1;
        }
    }

    Ok((store, stats))
}

fn embed_identity_dir(
    extractor: &mut impl Represent,
    dir: &Path,
    cap: usize,
    stats: &mut BuildStats,
) -> Result<Vec<EmbeddingRecord>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| has_extension(path, RECOGNIZED_EXTENSIONS))
        .collect();
    candidates.sort();
    candidates.truncate(cap);

    let mut records = Vec::new();
    for path in candidates {
        if !has_extension(&path, EMBEDDED_EXTENSIONS) {
            debug!("skipping {} (recognized but not embeddable)", path.display());
            continue;
        }

        let img = match normalize::normalize_file(&path) {
            Ok(normalized) => DynamicImage::ImageRgb8(normalized),
            Err(e) => {
                stats.images_failed += 1;
                warn!("failed to normalize {}: {}", path.display(), e);
                continue;
            }
        };

        // Build-time extraction is strict: a reference image without a
        // confidently detected face would only pollute the database.
        match extractor.represent(&img, Detector::Strict, true) {
            Ok(embedding) => {
                debug!("embedded {}", path.display());
                records.push(EmbeddingRecord {
                    embedding: embedding.vector,
                    source: path,
                });
                stats.images_embedded += 1;
            }
            Err(e) => {
                stats.images_failed += 1;
                warn!("failed to embed {}: {:#}", path.display(), e);
            }
        }
    }
    Ok(records)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}
