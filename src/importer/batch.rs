//! Concurrent batch import.
//!
//! Large trees must not serialize on hashing or metadata extraction, so the
//! batch path runs as strictly sequenced phases that are each internally
//! parallel on a bounded rayon pool: hash, classify against the catalog,
//! insert new files, reconcile known files, associate the album. The store's
//! unique constraint on the content hash remains the final arbiter when two
//! workers race on identical bytes.

use anyhow::{bail, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::{ImportOutcome, ImportSummary, PhotoImporter, TagImportOptions};
use crate::scanner::{discover_images, hashing};

/// Options for a concurrent batch import.
#[derive(Clone, Default)]
pub struct BatchOptions {
    /// Album every produced photo (new or reconciled) is associated with.
    pub album_id: Option<i64>,
    /// Sidecar tag import, applied per file.
    pub tag_options: Option<TagImportOptions>,
    /// Raised by the caller to stop scheduling new work units. Finished
    /// units stay imported; the summary carries partial counts.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl BatchOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Wall-clock spent in each batch phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub scan: Duration,
    pub hash: Duration,
    pub classify: Duration,
    pub import: Duration,
    pub reconcile: Duration,
    pub associate: Duration,
}

/// Result of a concurrent batch import.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Files discovered by the scan, whether or not they were processed.
    pub total: usize,
    pub timings: PhaseTimings,
}

impl PhotoImporter {
    /// Import a directory tree using the phased concurrent pipeline.
    ///
    /// Behaves like [`import_directory`](Self::import_directory) with respect
    /// to dedup, reconciliation and album association; only the execution
    /// strategy differs.
    pub fn import_directory_parallel(
        &self,
        root: &Path,
        recursive: bool,
        options: &BatchOptions,
    ) -> Result<BatchSummary> {
        if !root.is_dir() {
            bail!("directory not found: {}", root.display());
        }

        let mut timings = PhaseTimings::default();

        let started = Instant::now();
        let paths = discover_images(root, recursive, &self.config.import.supported_extensions)?;
        timings.scan = started.elapsed();

        if paths.is_empty() {
            warn!("no image files found in {}", root.display());
            return Ok(BatchSummary::default());
        }

        info!(
            "starting batch import: path={}, files={}, workers={}",
            root.display(),
            paths.len(),
            self.config.import.max_workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.import.max_workers)
            .build()?;

        let mut summary = BatchSummary {
            total: paths.len(),
            timings,
            ..Default::default()
        };

        // Phase: hash
        let started = Instant::now();
        let (hashed, hash_errors) = self.hash_phase(&pool, &paths, options);
        summary.timings.hash = started.elapsed();
        summary.errors += hash_errors;

        // Phase: classify against the catalog, one batched lookup
        let started = Instant::now();
        let all_hashes: Vec<String> = hashed.iter().map(|(_, h)| h.clone()).collect();
        let known = self.db.find_existing_hashes(&all_hashes)?;
        let (existing, new): (Vec<_>, Vec<_>) = hashed
            .into_iter()
            .partition(|(_, hash)| known.contains(hash));
        summary.timings.classify = started.elapsed();

        info!(
            "batch classification: new={}, existing={}, hash_errors={hash_errors}",
            new.len(),
            existing.len()
        );

        let mut photo_ids = Vec::new();

        // Phase: import new files in bounded slices
        let started = Instant::now();
        for slice in new.chunks(self.config.import.batch_size.max(1)) {
            let (imported, ids) = self.import_phase(&pool, slice, options, &mut summary)?;
            summary.imported += imported;
            photo_ids.extend(ids);
        }
        summary.timings.import = started.elapsed();

        // Phase: reconcile files whose content is already catalogued
        let started = Instant::now();
        let (skipped, ids) = self.reconcile_phase(&pool, &existing, options, &mut summary)?;
        summary.skipped += skipped;
        photo_ids.extend(ids);
        summary.timings.reconcile = started.elapsed();

        // Phase: album association, one transaction
        let started = Instant::now();
        if let Some(album_id) = options.album_id {
            let mut assoc = ImportSummary::default();
            self.associate_album(album_id, &photo_ids, &mut assoc);
            summary.errors += assoc.errors;
        }
        summary.timings.associate = started.elapsed();

        info!(
            "batch import completed: imported={}, skipped={}, errors={}, total={}, \
             hash={:?}, import={:?}, reconcile={:?}",
            summary.imported,
            summary.skipped,
            summary.errors,
            summary.total,
            summary.timings.hash,
            summary.timings.import,
            summary.timings.reconcile
        );

        Ok(summary)
    }

    /// Fan path→digest computation across the pool. Failures are counted and
    /// the paths excluded; nothing here cancels sibling work.
    fn hash_phase(
        &self,
        pool: &rayon::ThreadPool,
        paths: &[PathBuf],
        options: &BatchOptions,
    ) -> (Vec<(PathBuf, String)>, usize) {
        let errors = AtomicUsize::new(0);

        let hashed: Vec<(PathBuf, String)> = pool.install(|| {
            paths
                .par_iter()
                .filter_map(|path| {
                    if options.cancelled() {
                        return None;
                    }
                    match hashing::hash_file(path) {
                        Ok(hash) => Some((path.clone(), hash)),
                        Err(e) => {
                            error!("hashing failed for {}: {e:#}", path.display());
                            errors.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    }
                })
                .collect()
        });

        (hashed, errors.into_inner())
    }

    /// Insert one slice of new files concurrently. Each worker's insert is
    /// independent; a lost duplicate-hash race reconciles instead of failing.
    /// Returns (imported, produced ids); skips/errors are tallied in place.
    fn import_phase(
        &self,
        pool: &rayon::ThreadPool,
        slice: &[(PathBuf, String)],
        options: &BatchOptions,
        summary: &mut BatchSummary,
    ) -> Result<(usize, Vec<i64>)> {
        let outcomes: Vec<Result<Option<ImportOutcome>>> = pool.install(|| {
            slice
                .par_iter()
                .map(|(path, hash)| {
                    if options.cancelled() {
                        return Ok(None);
                    }
                    self.insert_new(path, hash.clone(), options.tag_options.as_ref())
                        .map(Some)
                })
                .collect()
        });

        let mut imported = 0;
        let mut ids = Vec::new();
        for outcome in outcomes {
            match outcome? {
                Some(ImportOutcome::Imported(id)) => {
                    imported += 1;
                    ids.push(id);
                }
                Some(ImportOutcome::Existing(id)) => {
                    summary.skipped += 1;
                    ids.push(id);
                }
                Some(ImportOutcome::Failed) => summary.errors += 1,
                None => {}
            }
        }

        Ok((imported, ids))
    }

    /// Reconcile known content concurrently: equal path is a no-op, new
    /// path is an update.
    fn reconcile_phase(
        &self,
        pool: &rayon::ThreadPool,
        existing: &[(PathBuf, String)],
        options: &BatchOptions,
        summary: &mut BatchSummary,
    ) -> Result<(usize, Vec<i64>)> {
        let outcomes: Vec<Result<Option<ImportOutcome>>> = pool.install(|| {
            existing
                .par_iter()
                .map(|(path, hash)| {
                    if options.cancelled() {
                        return Ok(None);
                    }
                    self.reconcile_known(path, hash, options.tag_options.as_ref())
                        .map(Some)
                })
                .collect()
        });

        let mut skipped = 0;
        let mut ids = Vec::new();
        for outcome in outcomes {
            match outcome? {
                Some(ImportOutcome::Existing(id)) => {
                    skipped += 1;
                    ids.push(id);
                }
                Some(ImportOutcome::Imported(id)) => {
                    // The record vanished after classification; it was
                    // re-imported fresh.
                    summary.imported += 1;
                    ids.push(id);
                }
                Some(ImportOutcome::Failed) => summary.errors += 1,
                None => {}
            }
        }

        Ok((skipped, ids))
    }

    fn reconcile_known(
        &self,
        path: &Path,
        hash: &str,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<ImportOutcome> {
        match self.db.find_by_hash(hash)? {
            Some(existing) => {
                let id = self.reconcile_existing(&existing, path)?;
                if let Some(tag_options) = tag_options {
                    self.apply_sidecar_tags(id, path, tag_options);
                }
                Ok(ImportOutcome::Existing(id))
            }
            // Classified as existing but deleted since: import it fresh.
            None => self.insert_new(path, hash.to_string(), tag_options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::importer_in;
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parallel_scenario_with_duplicates() {
        // 3 JPEGs, two byte-identical: both copies classify as new, the
        // unique constraint settles the race, counts match the sequential
        // path.
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("one.jpg"), b"first").unwrap();
        fs::write(photos.join("two.jpg"), b"second").unwrap();
        fs::write(photos.join("two-copy.jpg"), b"second").unwrap();

        let summary = importer
            .import_directory_parallel(&photos, true, &BatchOptions::default())
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_parallel_reimport_is_idempotent() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        for i in 0..6 {
            fs::write(photos.join(format!("p{i}.jpg")), format!("bytes-{i}")).unwrap();
        }

        let first = importer
            .import_directory_parallel(&photos, true, &BatchOptions::default())
            .unwrap();
        assert_eq!(first.imported, 6);

        let second = importer
            .import_directory_parallel(&photos, true, &BatchOptions::default())
            .unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 6);
        assert_eq!(second.errors, 0);
    }

    #[test]
    fn test_parallel_album_association() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("a.jpg"), b"alpha").unwrap();
        fs::write(photos.join("b.jpg"), b"beta").unwrap();

        let album = importer.db().create_album("batch", None).unwrap();
        let options = BatchOptions {
            album_id: Some(album),
            ..Default::default()
        };
        let summary = importer
            .import_directory_parallel(&photos, true, &options)
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(importer.db().album_photo_ids(album).unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_batch_returns_partial_counts() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        for i in 0..4 {
            fs::write(photos.join(format!("p{i}.jpg")), format!("bytes-{i}")).unwrap();
        }

        let cancel = Arc::new(AtomicBool::new(true));
        let options = BatchOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let summary = importer
            .import_directory_parallel(&photos, true, &options)
            .unwrap();
        // Pre-cancelled: nothing scheduled, nothing failed
        assert_eq!(summary.imported, 0);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.total, 4);
    }

    #[test]
    fn test_phase_timings_are_recorded() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("a.jpg"), b"alpha").unwrap();

        let summary = importer
            .import_directory_parallel(&photos, true, &BatchOptions::default())
            .unwrap();
        assert!(summary.timings.scan > Duration::ZERO);
        assert!(summary.timings.hash > Duration::ZERO);
    }
}
