//! Import orchestration: dedup-by-content, reconcile-by-path.
//!
//! A photo's identity is the SHA-256 of its bytes. Importing a file whose
//! hash is already catalogued never creates a second row; if the file now
//! lives somewhere else, the stored path is updated instead. Copy, move and
//! rename operations done outside the application are therefore absorbed
//! transparently.

mod batch;
mod recovery;
pub mod tags;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{Database, NewPhoto, PhotoRecord};
use crate::scanner::{self, ai_metadata, discover_images, hashing, metadata, ThumbnailManager};

pub use batch::{BatchOptions, BatchSummary, PhaseTimings};
pub use recovery::{MissingPhoto, RecoveryReport};
pub use tags::{StaticTranslator, TagImportOptions, TagTier, TierSelection, Translator};

/// Tally of one import operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// New records created.
    pub imported: usize,
    /// Files whose content was already catalogued (possibly re-pointed).
    pub skipped: usize,
    /// Per-file failures (unreadable file, failed insert).
    pub errors: usize,
    /// Files considered.
    pub total: usize,
}

/// Aggregate result of importing several roots.
#[derive(Debug, Clone, Default)]
pub struct DirectoriesSummary {
    pub totals: ImportSummary,
    pub per_directory: Vec<(PathBuf, ImportSummary)>,
    /// Roots that could not be imported at all, with the reason.
    pub failed_directories: Vec<(PathBuf, String)>,
}

/// How a single file fared.
enum ImportOutcome {
    /// A new record was created.
    Imported(i64),
    /// Content already catalogued; record possibly re-pointed.
    Existing(i64),
    /// Per-file failure, recorded and excluded.
    Failed,
}

/// The import engine. Cheap to share by reference across worker threads.
pub struct PhotoImporter {
    config: Config,
    db: Database,
    thumbnails: ThumbnailManager,
    translator: Box<dyn Translator>,
}

impl PhotoImporter {
    pub fn new(config: Config, db: Database) -> Self {
        let thumbnails = ThumbnailManager::new(&config.thumbnails);
        Self {
            config,
            db,
            thumbnails,
            translator: Box::new(StaticTranslator::new()),
        }
    }

    /// Replace the translation collaborator used by the tag importer.
    pub fn with_translator(mut self, translator: Box<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Single-file import
    // ========================================================================

    /// Import one photo. Returns the record id, or `None` when the path is
    /// missing or not a supported image (logged, not an error). Only store
    /// failures surface as `Err`.
    pub fn import_photo(&self, path: &Path) -> Result<Option<i64>> {
        self.import_photo_with_tags(path, None)
    }

    /// Like [`import_photo`](Self::import_photo), additionally importing a
    /// sidecar tag file when present.
    pub fn import_photo_with_tags(
        &self,
        path: &Path,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<Option<i64>> {
        if !path.exists() {
            warn!("file not found: {}", path.display());
            return Ok(None);
        }
        if !self.is_supported(path) {
            warn!("unsupported file format: {}", path.display());
            return Ok(None);
        }

        match self.import_one(path, tag_options)? {
            ImportOutcome::Imported(id) | ImportOutcome::Existing(id) => Ok(Some(id)),
            ImportOutcome::Failed => Ok(None),
        }
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| self.config.is_supported_extension(&e.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Hash, dedup-check and persist one file from a scan result.
    ///
    /// The path is assumed to have passed the extension allow-list. Per-file
    /// problems become [`ImportOutcome::Failed`]; `Err` is reserved for the
    /// store itself.
    fn import_one(
        &self,
        path: &Path,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<ImportOutcome> {
        let content_hash = match hashing::hash_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                error!("hashing failed for {}: {e:#}", path.display());
                return Ok(ImportOutcome::Failed);
            }
        };

        if let Some(existing) = self.db.find_by_hash(&content_hash)? {
            let id = self.reconcile_existing(&existing, path)?;
            if let Some(options) = tag_options {
                self.apply_sidecar_tags(id, path, options);
            }
            return Ok(ImportOutcome::Existing(id));
        }

        self.insert_new(path, content_hash, tag_options)
    }

    /// Insert a new record, falling back to reconciliation when another
    /// worker catalogued the same content first.
    fn insert_new(
        &self,
        path: &Path,
        content_hash: String,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<ImportOutcome> {
        let photo = self.build_new_photo(path, content_hash.clone(), tag_options);

        match self.db.insert_photo(&photo) {
            Ok(id) => {
                info!("photo imported: id={id}, path={}", path.display());
                Ok(ImportOutcome::Imported(id))
            }
            Err(crate::db::CatalogError::DuplicateHash(_)) => {
                // Lost an insert race; the winning row is authoritative.
                debug!("duplicate insert for {}, reconciling", path.display());
                match self.db.find_by_hash(&content_hash)? {
                    Some(existing) => {
                        let id = self.reconcile_existing(&existing, path)?;
                        if let Some(options) = tag_options {
                            self.apply_sidecar_tags(id, path, options);
                        }
                        Ok(ImportOutcome::Existing(id))
                    }
                    None => {
                        // Conflict row vanished between insert and lookup;
                        // treat as a per-file error rather than retrying.
                        error!("conflicting record disappeared for {}", path.display());
                        Ok(ImportOutcome::Failed)
                    }
                }
            }
            Err(crate::db::CatalogError::Database(e)) => {
                Err(e).context("photo insert failed")
            }
        }
    }

    /// Build the insert payload: metadata, AI metadata and thumbnail are all
    /// best-effort; their failure leaves fields empty but never blocks the
    /// insert.
    pub(crate) fn build_new_photo(
        &self,
        path: &Path,
        content_hash: String,
        tag_options: Option<&TagImportOptions>,
    ) -> NewPhoto {
        let meta = metadata::extract_metadata(path).unwrap_or_else(|e| {
            warn!("metadata extraction failed for {}: {e:#}", path.display());
            scanner::ImageMetadata::default()
        });
        let ai = ai_metadata::extract(path);

        let thumbnail_path = if self.config.import.generate_thumbnails {
            match self.thumbnails.generate(path) {
                Ok(thumb) => thumb.to_string_lossy().to_string(),
                Err(e) => {
                    warn!("thumbnail generation failed for {}: {e:#}", path.display());
                    String::new()
                }
            }
        } else {
            String::new()
        };

        let file_size = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
        let filepath = absolute_path(path);

        let tags = tag_options.and_then(|options| {
            tags::sidecar_tags(path, options, self.translator.as_ref())
        });

        NewPhoto {
            content_hash,
            filepath: filepath.to_string_lossy().to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_size,
            width: meta.width.map(i64::from),
            height: meta.height.map(i64::from),
            format: meta.format.clone(),
            date_taken: meta.date_taken.clone(),
            exif_data: serde_json::to_string(&meta).ok(),
            ai_metadata: serde_json::to_string(&ai).ok(),
            is_ai_generated: ai.is_ai_generated,
            thumbnail_path,
            tags,
        }
    }

    /// The found-branch of the dedup decision: same content, possibly at a
    /// new location.
    pub(crate) fn reconcile_existing(&self, existing: &PhotoRecord, path: &Path) -> Result<i64> {
        let current = absolute_path(path);
        let current_str = current.to_string_lossy().to_string();

        if existing.filepath == current_str {
            debug!("photo already catalogued at same location: {current_str}");
            return Ok(existing.id);
        }

        info!(
            "photo moved, updating path: id={}, old={}, new={current_str}",
            existing.id, existing.filepath
        );

        let file_size = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| existing.filename.clone());
        self.db
            .update_location(existing.id, &current_str, &filename, file_size)?;

        // AI metadata is re-read from the file on relocation
        let ai = ai_metadata::extract(path);
        if let Ok(json) = serde_json::to_string(&ai) {
            self.db
                .set_ai_metadata(existing.id, &json, ai.is_ai_generated)?;
        }

        self.regenerate_missing_thumbnail(existing, path)?;

        Ok(existing.id)
    }

    fn regenerate_missing_thumbnail(&self, existing: &PhotoRecord, path: &Path) -> Result<()> {
        if !self.config.import.generate_thumbnails {
            return Ok(());
        }
        let missing =
            existing.thumbnail_path.is_empty() || !Path::new(&existing.thumbnail_path).exists();
        if !missing {
            return Ok(());
        }

        match self.thumbnails.generate(path) {
            Ok(thumb) => {
                self.db
                    .set_thumbnail_path(existing.id, &thumb.to_string_lossy())?;
                debug!("regenerated thumbnail for photo {}", existing.id);
            }
            Err(e) => {
                warn!("thumbnail regeneration failed for {}: {e:#}", path.display());
            }
        }
        Ok(())
    }

    fn apply_sidecar_tags(&self, photo_id: i64, path: &Path, options: &TagImportOptions) {
        if let Err(e) =
            tags::import_tags_for_photo(&self.db, self.translator.as_ref(), photo_id, path, options)
        {
            warn!("tag import failed for {}: {e:#}", path.display());
        }
    }

    // ========================================================================
    // Directory import (sequential baseline)
    // ========================================================================

    /// Import every supported image under `root`, one file at a time.
    ///
    /// Fails only when `root` does not exist or the store breaks; everything
    /// per-file is tallied into the summary. With `album_id`, every photo the
    /// call produced (new or already catalogued) is associated with that
    /// album in one batched call at the end.
    pub fn import_directory(
        &self,
        root: &Path,
        recursive: bool,
        album_id: Option<i64>,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<ImportSummary> {
        if !root.is_dir() {
            bail!("directory not found: {}", root.display());
        }

        let paths = discover_images(root, recursive, &self.config.import.supported_extensions)?;
        if paths.is_empty() {
            warn!("no image files found in {}", root.display());
            return Ok(ImportSummary::default());
        }

        info!(
            "starting directory import: path={}, recursive={recursive}, files={}",
            root.display(),
            paths.len()
        );

        let summary = self.import_paths(&paths, album_id, tag_options)?;

        info!(
            "directory import completed: path={}, imported={}, skipped={}, errors={}",
            root.display(),
            summary.imported,
            summary.skipped,
            summary.errors
        );

        Ok(summary)
    }

    /// Import an explicit file list, tallying outcomes.
    pub fn import_paths(
        &self,
        paths: &[PathBuf],
        album_id: Option<i64>,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<ImportSummary> {
        let mut summary = ImportSummary {
            total: paths.len(),
            ..Default::default()
        };
        let mut photo_ids = Vec::new();

        for path in paths {
            match self.import_one(path, tag_options)? {
                ImportOutcome::Imported(id) => {
                    summary.imported += 1;
                    photo_ids.push(id);
                }
                ImportOutcome::Existing(id) => {
                    summary.skipped += 1;
                    photo_ids.push(id);
                }
                ImportOutcome::Failed => summary.errors += 1,
            }
        }

        if let Some(album_id) = album_id {
            self.associate_album(album_id, &photo_ids, &mut summary);
        }

        Ok(summary)
    }

    /// Import several roots, aggregating results. A missing root is recorded
    /// and skipped; it does not abort the remaining roots.
    pub fn import_directories(
        &self,
        roots: &[PathBuf],
        recursive: bool,
        album_id: Option<i64>,
        tag_options: Option<&TagImportOptions>,
    ) -> Result<DirectoriesSummary> {
        if roots.is_empty() {
            bail!("no directories provided");
        }

        let mut result = DirectoriesSummary::default();

        for root in roots {
            if !root.is_dir() {
                warn!("directory not found, skipping: {}", root.display());
                result
                    .failed_directories
                    .push((root.clone(), "directory not found".to_string()));
                continue;
            }

            match self.import_directory(root, recursive, album_id, tag_options) {
                Ok(summary) => {
                    result.totals.imported += summary.imported;
                    result.totals.skipped += summary.skipped;
                    result.totals.errors += summary.errors;
                    result.totals.total += summary.total;
                    result.per_directory.push((root.clone(), summary));
                }
                Err(e) => {
                    error!("directory import failed: path={}, {e:#}", root.display());
                    result.failed_directories.push((root.clone(), format!("{e:#}")));
                }
            }
        }

        Ok(result)
    }

    /// One batched album association; a failure costs one summary error
    /// instead of aborting the import (the photos themselves are catalogued).
    pub(crate) fn associate_album(
        &self,
        album_id: i64,
        photo_ids: &[i64],
        summary: &mut ImportSummary,
    ) {
        if photo_ids.is_empty() {
            return;
        }
        match self.db.batch_add_photos_to_album(album_id, photo_ids) {
            Ok(assoc) => {
                info!(
                    "album association: album={album_id}, added={}, skipped={}",
                    assoc.added, assoc.skipped
                );
            }
            Err(e) => {
                error!("album association failed: album={album_id}, {e:#}");
                summary.errors += 1;
            }
        }
    }
}

/// Absolute form of a path without touching the filesystem, so vanished
/// files still get a stable representation.
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::Path;

    pub fn importer_in(dir: &Path) -> PhotoImporter {
        let mut config = Config::default();
        config.db_path = dir.join("catalog.db");
        config.thumbnails.path = dir.join("thumbs");
        config.import.max_workers = 2;
        config.recovery.search_roots = vec![dir.to_path_buf()];
        let db = Database::open(&config.db_path).unwrap();
        PhotoImporter::new(config, db)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::importer_in;
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_import_single_photo() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"content-a").unwrap();

        let id = importer.import_photo(&photo).unwrap().unwrap();
        let record = importer.db().get_photo(id).unwrap().unwrap();
        assert_eq!(record.filepath, photo.to_string_lossy());
        assert_eq!(record.file_size, 9);
        assert!(!record.content_hash.is_empty());
    }

    #[test]
    fn test_unsupported_and_missing_are_not_errors() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let doc = dir.path().join("notes.txt");
        fs::write(&doc, b"text").unwrap();

        assert!(importer.import_photo(&doc).unwrap().is_none());
        assert!(importer
            .import_photo(&dir.path().join("gone.jpg"))
            .unwrap()
            .is_none());
        assert_eq!(importer.db().photo_count().unwrap(), 0);
    }

    #[test]
    fn test_identical_content_yields_one_record() {
        // P1: two byte-identical files, one catalog row
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        let id_a = importer.import_photo(&a).unwrap().unwrap();
        let id_b = importer.import_photo(&b).unwrap().unwrap();
        assert_eq!(id_a, id_b);
        assert_eq!(importer.db().photo_count().unwrap(), 1);
    }

    #[test]
    fn test_move_is_transparent() {
        // P2: moving a file re-points the record, same id and hash
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let original = dir.path().join("a.jpg");
        fs::write(&original, b"payload").unwrap();
        let id = importer.import_photo(&original).unwrap().unwrap();
        let hash_before = importer.db().get_photo(id).unwrap().unwrap().content_hash;

        fs::create_dir(dir.path().join("moved")).unwrap();
        let relocated = dir.path().join("moved/a.jpg");
        fs::rename(&original, &relocated).unwrap();

        let id_again = importer.import_photo(&relocated).unwrap().unwrap();
        assert_eq!(id, id_again);

        let record = importer.db().get_photo(id).unwrap().unwrap();
        assert_eq!(record.filepath, relocated.to_string_lossy());
        assert_eq!(record.content_hash, hash_before);
        assert_eq!(importer.db().photo_count().unwrap(), 1);
    }

    #[test]
    fn test_directory_import_scenario() {
        // Scenario: 3 JPEGs, two byte-identical under different names
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("one.jpg"), b"first").unwrap();
        fs::write(photos.join("two.jpg"), b"second").unwrap();
        fs::write(photos.join("two-copy.jpg"), b"second").unwrap();

        let summary = importer
            .import_directory(&photos, true, None, None)
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        // P5: second run of an unchanged directory imports nothing
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        for i in 0..4 {
            fs::write(photos.join(format!("p{i}.jpg")), format!("bytes-{i}")).unwrap();
        }

        let first = importer.import_directory(&photos, true, None, None).unwrap();
        assert_eq!(first.imported, 4);
        assert_eq!(first.skipped, 0);

        let second = importer.import_directory(&photos, true, None, None).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 4);
        assert_eq!(second.errors, 0);
    }

    #[test]
    fn test_vanished_file_is_isolated() {
        // P6: one unreadable file costs one error, siblings import fine
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"alpha").unwrap();
        fs::write(&b, b"beta").unwrap();
        let ghost = dir.path().join("ghost.jpg");

        let summary = importer
            .import_paths(&[a, ghost, b], None, None)
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_empty_directory_yields_zero_summary() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();

        let summary = importer.import_directory(&empty, true, None, None).unwrap();
        assert_eq!(summary, ImportSummary::default());

        assert!(importer
            .import_directory(&dir.path().join("nope"), true, None, None)
            .is_err());
    }

    #[test]
    fn test_album_association_covers_new_and_existing() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("a.jpg"), b"alpha").unwrap();
        fs::write(photos.join("b.jpg"), b"beta").unwrap();

        // First import without an album, then re-import into one: the
        // association must cover the already-catalogued photos too.
        importer.import_directory(&photos, true, None, None).unwrap();
        let album = importer.db().create_album("trip", None).unwrap();
        let summary = importer
            .import_directory(&photos, true, Some(album), None)
            .unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(importer.db().album_photo_ids(album).unwrap().len(), 2);
    }

    #[test]
    fn test_import_directories_skips_missing_roots() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let good = dir.path().join("good");
        fs::create_dir(&good).unwrap();
        fs::write(good.join("a.jpg"), b"alpha").unwrap();

        let result = importer
            .import_directories(
                &[good.clone(), dir.path().join("missing")],
                true,
                None,
                None,
            )
            .unwrap();
        assert_eq!(result.totals.imported, 1);
        assert_eq!(result.per_directory.len(), 1);
        assert_eq!(result.failed_directories.len(), 1);
    }
}
