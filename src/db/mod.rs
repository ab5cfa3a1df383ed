//! SQLite-backed photo catalog.
//!
//! The connection sits behind a mutex so batch-import worker pools can share
//! one `Database`. Each public call locks for the duration of a single
//! statement or transaction; hashing, metadata extraction and thumbnail work
//! all happen outside the lock.

mod schema;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

pub use schema::SCHEMA;

/// Hashes per query when doing batched existence lookups, bounding the
/// number of bound SQL parameters.
pub const HASH_LOOKUP_CHUNK: usize = 100;

/// Store-level errors the importer needs to branch on.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Unique-constraint conflict on `content_hash`: another insert of the
    /// same bytes won the race. The importer falls back to reconciliation.
    #[error("content hash already catalogued: {0}")]
    DuplicateHash(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// One catalogued photo.
#[derive(Debug, Clone, Default)]
pub struct PhotoRecord {
    pub id: i64,
    pub content_hash: String,
    pub filepath: String,
    pub filename: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub format: Option<String>,
    pub date_taken: Option<String>,
    pub date_added: String,
    pub date_modified: Option<String>,
    pub exif_data: Option<String>,
    pub ai_metadata: Option<String>,
    pub is_ai_generated: bool,
    pub thumbnail_path: String,
    pub tags: String,
    pub simple_tags: String,
    pub normal_tags: String,
    pub detailed_tags: String,
    pub tag_translations: String,
    pub rating: i64,
    pub is_favorite: bool,
    pub notes: String,
}

/// Insert payload for a newly imported photo.
#[derive(Debug, Clone, Default)]
pub struct NewPhoto {
    pub content_hash: String,
    pub filepath: String,
    pub filename: String,
    pub file_size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub format: Option<String>,
    pub date_taken: Option<String>,
    pub exif_data: Option<String>,
    pub ai_metadata: Option<String>,
    pub is_ai_generated: bool,
    pub thumbnail_path: String,
    pub tags: Option<TagUpdate>,
}

/// The independently writable tag tiers of a photo.
#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub tags: Vec<String>,
    pub simple_tags: Vec<String>,
    pub normal_tags: Vec<String>,
    pub detailed_tags: Vec<String>,
    pub tag_translations: serde_json::Map<String, serde_json::Value>,
}

/// Minimal projection used by the missing-file sweep.
#[derive(Debug, Clone)]
pub struct PhotoLocation {
    pub id: i64,
    pub filepath: String,
    pub filename: String,
    pub content_hash: String,
}

/// Outcome of a batched album association.
#[derive(Debug, Clone, Default)]
pub struct AlbumAssociation {
    pub added: usize,
    pub skipped: usize,
}

/// Current time in the catalog's timestamp format (UTC, second precision).
pub(crate) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open (creating parent directories if needed) and initialize the
    /// catalog at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Recover the connection if a previous holder panicked
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Photo operations
    // ========================================================================

    /// Insert a new photo row. A unique-constraint conflict on the content
    /// hash is reported as [`CatalogError::DuplicateHash`] so callers can
    /// fall back to the existing-record path.
    pub fn insert_photo(&self, photo: &NewPhoto) -> Result<i64, CatalogError> {
        let tags = photo.tags.clone().unwrap_or_default();
        let conn = self.conn();
        let result = conn.execute(
            r#"
            INSERT INTO photos (
                content_hash, filepath, filename, file_size,
                width, height, format,
                date_taken, date_added, date_modified,
                exif_data, ai_metadata, is_ai_generated,
                thumbnail_path,
                tags, simple_tags, normal_tags, detailed_tags, tag_translations
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                photo.content_hash,
                photo.filepath,
                photo.filename,
                photo.file_size,
                photo.width,
                photo.height,
                photo.format,
                photo.date_taken,
                now_timestamp(),
                now_timestamp(),
                photo.exif_data,
                photo.ai_metadata,
                photo.is_ai_generated,
                photo.thumbnail_path,
                json_array(&tags.tags),
                json_array(&tags.simple_tags),
                json_array(&tags.normal_tags),
                json_array(&tags.detailed_tags),
                serde_json::Value::Object(tags.tag_translations).to_string(),
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                Err(CatalogError::DuplicateHash(photo.content_hash.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_hash(&self, content_hash: &str) -> Result<Option<PhotoRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE content_hash = ?"
        ))?;
        let mut rows = stmt.query_map([content_hash], row_to_photo)?;
        Ok(rows.next().transpose()?)
    }

    pub fn get_photo(&self, id: i64) -> Result<Option<PhotoRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"))?;
        let mut rows = stmt.query_map([id], row_to_photo)?;
        Ok(rows.next().transpose()?)
    }

    /// Re-point a record at a new on-disk location, refreshing the size and
    /// touching `date_modified`. The content hash is left untouched.
    pub fn update_location(
        &self,
        id: i64,
        filepath: &str,
        filename: &str,
        file_size: i64,
    ) -> Result<()> {
        self.conn().execute(
            r#"
            UPDATE photos
            SET filepath = ?, filename = ?, file_size = ?, date_modified = ?
            WHERE id = ?
            "#,
            params![filepath, filename, file_size, now_timestamp(), id],
        )?;
        Ok(())
    }

    pub fn set_thumbnail_path(&self, id: i64, thumbnail_path: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE photos SET thumbnail_path = ? WHERE id = ?",
            params![thumbnail_path, id],
        )?;
        Ok(())
    }

    pub fn set_ai_metadata(&self, id: i64, ai_metadata: &str, is_ai_generated: bool) -> Result<()> {
        self.conn().execute(
            "UPDATE photos SET ai_metadata = ?, is_ai_generated = ? WHERE id = ?",
            params![ai_metadata, is_ai_generated, id],
        )?;
        Ok(())
    }

    pub fn set_photo_tags(&self, id: i64, tags: &TagUpdate) -> Result<()> {
        self.conn().execute(
            r#"
            UPDATE photos
            SET tags = ?, simple_tags = ?, normal_tags = ?, detailed_tags = ?,
                tag_translations = ?
            WHERE id = ?
            "#,
            params![
                json_array(&tags.tags),
                json_array(&tags.simple_tags),
                json_array(&tags.normal_tags),
                json_array(&tags.detailed_tags),
                serde_json::Value::Object(tags.tag_translations.clone()).to_string(),
                id,
            ],
        )?;
        Ok(())
    }

    /// Which of `hashes` are already catalogued. Queries run in
    /// [`HASH_LOOKUP_CHUNK`]-sized slices to bound statement size.
    pub fn find_existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();
        let conn = self.conn();

        for chunk in hashes.chunks(HASH_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql =
                format!("SELECT content_hash FROM photos WHERE content_hash IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            for hash in rows {
                existing.insert(hash?);
            }
        }

        debug!(
            "hash lookup: {} checked, {} already catalogued",
            hashes.len(),
            existing.len()
        );

        Ok(existing)
    }

    /// Record ids for the given content hashes, chunked like
    /// [`find_existing_hashes`].
    pub fn photo_ids_by_hashes(&self, hashes: &[String]) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        let conn = self.conn();

        for chunk in hashes.chunks(HASH_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT id FROM photos WHERE content_hash IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                row.get::<_, i64>(0)
            })?;
            for id in rows {
                ids.push(id?);
            }
        }

        Ok(ids)
    }

    /// Every record's id, path, filename and hash, for the missing-file sweep.
    pub fn photo_locations(&self) -> Result<Vec<PhotoLocation>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, filepath, filename, content_hash FROM photos ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(PhotoLocation {
                id: row.get(0)?,
                filepath: row.get(1)?,
                filename: row.get(2)?,
                content_hash: row.get(3)?,
            })
        })?;

        let mut locations = Vec::new();
        for row in rows {
            locations.push(row?);
        }
        Ok(locations)
    }

    pub fn photo_count(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete a record and its cached thumbnail file. Returns false when the
    /// id is unknown.
    pub fn delete_photo(&self, id: i64) -> Result<bool> {
        let Some(photo) = self.get_photo(id)? else {
            return Ok(false);
        };

        self.conn()
            .execute("DELETE FROM photos WHERE id = ?", [id])?;

        if !photo.thumbnail_path.is_empty() {
            let thumb = Path::new(&photo.thumbnail_path);
            if thumb.exists() {
                if let Err(e) = std::fs::remove_file(thumb) {
                    warn!("could not remove thumbnail {}: {e}", thumb.display());
                }
            }
        }

        Ok(true)
    }

    // ========================================================================
    // Album operations
    // ========================================================================

    pub fn create_album(&self, name: &str, description: Option<&str>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO albums (name, description, created_date) VALUES (?, ?, ?)",
            params![name, description, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn album_exists(&self, album_id: i64) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM albums WHERE id = ?",
            [album_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Associate a set of photos with an album in one transaction.
    ///
    /// Photos already in the album are skipped, and the album's cached
    /// photo count is refreshed before commit.
    pub fn batch_add_photos_to_album(
        &self,
        album_id: i64,
        photo_ids: &[i64],
    ) -> Result<AlbumAssociation> {
        if photo_ids.is_empty() {
            return Ok(AlbumAssociation::default());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let album_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM albums WHERE id = ?",
            [album_id],
            |row| row.get(0),
        )?;
        if album_count == 0 {
            anyhow::bail!("album {album_id} does not exist");
        }

        let mut added = 0usize;
        let mut skipped = 0usize;
        let now = now_timestamp();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO album_photos (album_id, photo_id, added_date) VALUES (?, ?, ?)",
            )?;
            for photo_id in photo_ids {
                if stmt.execute(params![album_id, photo_id, now])? > 0 {
                    added += 1;
                } else {
                    skipped += 1;
                }
            }
        }

        tx.execute(
            r#"
            UPDATE albums
            SET photo_count = (SELECT COUNT(*) FROM album_photos WHERE album_id = ?)
            WHERE id = ?
            "#,
            params![album_id, album_id],
        )?;

        tx.commit()?;

        Ok(AlbumAssociation { added, skipped })
    }

    pub fn album_photo_ids(&self, album_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT photo_id FROM album_photos WHERE album_id = ? ORDER BY photo_id")?;
        let rows = stmt.query_map([album_id], |row| row.get::<_, i64>(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }
}

const PHOTO_COLUMNS: &str = "id, content_hash, filepath, filename, file_size, \
     width, height, format, date_taken, date_added, date_modified, \
     exif_data, ai_metadata, is_ai_generated, thumbnail_path, \
     tags, simple_tags, normal_tags, detailed_tags, tag_translations, \
     rating, is_favorite, notes";

fn row_to_photo(row: &rusqlite::Row<'_>) -> rusqlite::Result<PhotoRecord> {
    Ok(PhotoRecord {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        filepath: row.get(2)?,
        filename: row.get(3)?,
        file_size: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        format: row.get(7)?,
        date_taken: row.get(8)?,
        date_added: row.get(9)?,
        date_modified: row.get(10)?,
        exif_data: row.get(11)?,
        ai_metadata: row.get(12)?,
        is_ai_generated: row.get(13)?,
        thumbnail_path: row.get(14)?,
        tags: row.get(15)?,
        simple_tags: row.get(16)?,
        normal_tags: row.get(17)?,
        detailed_tags: row.get(18)?,
        tag_translations: row.get(19)?,
        rating: row.get(20)?,
        is_favorite: row.get(21)?,
        notes: row.get(22)?,
    })
}

fn json_array(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}
