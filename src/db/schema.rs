pub const SCHEMA: &str = r#"
-- Photos table: one row per catalogued photo, keyed by content
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,

    -- Content identity: hex SHA-256 of the file bytes, never updated
    content_hash TEXT NOT NULL UNIQUE,

    -- Location: updated when the same content is found elsewhere
    filepath TEXT NOT NULL,
    filename TEXT NOT NULL,
    file_size INTEGER NOT NULL,

    -- Image properties
    width INTEGER,
    height INTEGER,
    format TEXT,

    -- Timestamps (ISO-8601, UTC)
    date_taken TEXT,
    date_added TEXT NOT NULL,
    date_modified TEXT,

    -- Metadata blobs (JSON)
    exif_data TEXT,
    ai_metadata TEXT,
    is_ai_generated INTEGER DEFAULT 0,

    thumbnail_path TEXT DEFAULT '',

    -- Tag tiers (JSON arrays) and translations (JSON object)
    tags TEXT DEFAULT '[]',
    simple_tags TEXT DEFAULT '[]',
    normal_tags TEXT DEFAULT '[]',
    detailed_tags TEXT DEFAULT '[]',
    tag_translations TEXT DEFAULT '{}',

    -- User state, written outside the import engine
    rating INTEGER DEFAULT 0,
    is_favorite INTEGER DEFAULT 0,
    notes TEXT DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_photos_filepath ON photos(filepath);
CREATE INDEX IF NOT EXISTS idx_photos_filename ON photos(filename);
CREATE INDEX IF NOT EXISTS idx_photos_date_taken ON photos(date_taken);

-- Albums
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    cover_photo_id INTEGER,
    photo_count INTEGER DEFAULT 0,
    FOREIGN KEY (cover_photo_id) REFERENCES photos(id) ON DELETE SET NULL
);

-- Album membership
CREATE TABLE IF NOT EXISTS album_photos (
    album_id INTEGER NOT NULL,
    photo_id INTEGER NOT NULL,
    added_date TEXT,
    PRIMARY KEY (album_id, photo_id),
    FOREIGN KEY (album_id) REFERENCES albums(id) ON DELETE CASCADE,
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_album_photos_album ON album_photos(album_id);
"#;
