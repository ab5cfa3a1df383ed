//! Missing-file recovery.
//!
//! When a catalogued file no longer exists at its stored path, the record is
//! not discarded: the configured search roots are swept for files carrying
//! the same name, and a candidate is accepted only when its recomputed
//! content hash equals the stored one. A same-named but different file can
//! therefore never hijack a catalog entry.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::{absolute_path, PhotoImporter};
use crate::scanner::hashing;

/// A record whose backing file could not be located.
#[derive(Debug, Clone)]
pub struct MissingPhoto {
    pub id: i64,
    pub filepath: String,
    pub filename: String,
}

/// Outcome of a missing-file sweep.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Records examined.
    pub total: usize,
    /// Records whose stored path no longer resolves.
    pub missing: usize,
    /// Records re-pointed to a verified relocation.
    pub fixed: usize,
    /// Failures while verifying or updating candidates.
    pub errors: usize,
    /// Still-missing records, for the caller to surface.
    pub unresolved: Vec<MissingPhoto>,
}

impl PhotoImporter {
    /// Sweep the catalog for records whose file is gone and try to recover
    /// them from the configured search roots. Never deletes or fabricates
    /// records; whatever stays unresolved is reported.
    pub fn find_and_fix_missing_files(&self) -> Result<RecoveryReport> {
        let locations = self.db.photo_locations()?;
        let mut report = RecoveryReport {
            total: locations.len(),
            ..Default::default()
        };

        for location in locations {
            if Path::new(&location.filepath).exists() {
                continue;
            }
            report.missing += 1;

            match self.locate_by_name_and_hash(&location.filename, &location.content_hash) {
                Some(found) => match self.update_photo_location(location.id, &found) {
                    Ok(true) => {
                        info!(
                            "recovered missing file: id={}, old={}, new={}",
                            location.id,
                            location.filepath,
                            found.display()
                        );
                        report.fixed += 1;
                    }
                    Ok(false) => {
                        // The candidate changed between discovery and
                        // verification; leave the record missing.
                        report.errors += 1;
                        report.unresolved.push(MissingPhoto {
                            id: location.id,
                            filepath: location.filepath,
                            filename: location.filename,
                        });
                    }
                    Err(e) => {
                        warn!("failed to update location for {}: {e:#}", location.id);
                        report.errors += 1;
                        report.unresolved.push(MissingPhoto {
                            id: location.id,
                            filepath: location.filepath,
                            filename: location.filename,
                        });
                    }
                },
                None => {
                    report.unresolved.push(MissingPhoto {
                        id: location.id,
                        filepath: location.filepath,
                        filename: location.filename,
                    });
                }
            }
        }

        info!(
            "missing-file sweep: total={}, missing={}, fixed={}, errors={}",
            report.total, report.missing, report.fixed, report.errors
        );

        Ok(report)
    }

    /// Re-point a record at `new_path` after verifying the content hash
    /// matches. Returns false (without modifying the record) on mismatch or
    /// when the file is unreadable.
    pub fn update_photo_location(&self, id: i64, new_path: &Path) -> Result<bool> {
        let Some(photo) = self.db.get_photo(id)? else {
            warn!("photo not found: id={id}");
            return Ok(false);
        };

        let actual_hash = match hashing::hash_file(new_path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("cannot hash {}: {e:#}", new_path.display());
                return Ok(false);
            }
        };
        if actual_hash != photo.content_hash {
            warn!(
                "hash mismatch, refusing relocation: id={id}, path={}",
                new_path.display()
            );
            return Ok(false);
        }

        let file_size = std::fs::metadata(new_path)
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let filename = new_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| photo.filename.clone());
        let filepath = absolute_path(new_path);
        self.db.update_location(
            id,
            &filepath.to_string_lossy(),
            &filename,
            file_size,
        )?;

        self.regenerate_missing_thumbnail(&photo, new_path)?;

        Ok(true)
    }

    /// Search the recovery roots for a file named `filename` whose content
    /// hash equals `expected_hash`. A name match alone is never enough.
    fn locate_by_name_and_hash(&self, filename: &str, expected_hash: &str) -> Option<PathBuf> {
        for root in &self.config.recovery.search_roots {
            if !root.is_dir() {
                continue;
            }

            for entry in WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if path.file_name().and_then(|n| n.to_str()) != Some(filename) {
                    continue;
                }

                match hashing::hash_file(path) {
                    Ok(hash) if hash == expected_hash => return Some(path.to_path_buf()),
                    Ok(_) => {
                        // Same name, different bytes: keep looking.
                        continue;
                    }
                    Err(e) => {
                        warn!("cannot hash candidate {}: {e:#}", path.display());
                        continue;
                    }
                }
            }
        }

        None
    }
}
