use anyhow::Result;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ThumbnailConfig;

/// Generates and caches thumbnails for catalogued photos.
pub struct ThumbnailManager {
    cache_dir: PathBuf,
    size: u32,
    quality: u8,
}

impl ThumbnailManager {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
            size: config.size,
            quality: config.quality,
        }
    }

    fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    /// Cache filename derived from the source path, so the same source maps
    /// to the same thumbnail across runs.
    fn cache_path(&self, original: &Path) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        original.to_string_lossy().hash(&mut hasher);
        let hash = hasher.finish();

        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "thumb".to_string());

        self.cache_dir.join(format!("{stem}_{hash:016x}.jpg"))
    }

    /// Get the cached thumbnail path if one exists on disk.
    pub fn cached_path(&self, original: &Path) -> Option<PathBuf> {
        let cache_path = self.cache_path(original);
        if cache_path.exists() {
            Some(cache_path)
        } else {
            None
        }
    }

    /// Generate and cache a thumbnail, returning the cache path.
    ///
    /// Skips work when a cached copy exists. EXIF orientation is applied so
    /// thumbnails display upright.
    pub fn generate(&self, original: &Path) -> Result<PathBuf> {
        self.ensure_cache_dir()?;

        let cache_path = self.cache_path(original);
        if cache_path.exists() {
            return Ok(cache_path);
        }

        let img = image::open(original)?;
        let mut thumbnail = img.thumbnail(self.size, self.size);

        thumbnail = match read_exif_rotation(original) {
            90 => thumbnail.rotate90(),
            180 => thumbnail.rotate180(),
            270 => thumbnail.rotate270(),
            _ => thumbnail,
        };

        // JPEG output keeps the cache small and fast to load
        let mut out = File::create(&cache_path)?;
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.quality);
        thumbnail.to_rgb8().write_with_encoder(encoder)?;

        debug!(
            "thumbnail generated: {} -> {}",
            original.display(),
            cache_path.display()
        );

        Ok(cache_path)
    }

    /// Remove the cached thumbnail for a source file, if present.
    pub fn delete(&self, original: &Path) -> Result<bool> {
        let cache_path = self.cache_path(original);
        if cache_path.exists() {
            fs::remove_file(&cache_path)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Convert EXIF orientation value (1-8) to rotation degrees (0, 90, 180, 270)
fn exif_orientation_to_degrees(orientation: u16) -> u32 {
    match orientation {
        6 => 90,  // Rotate 90 CW
        3 => 180, // Rotate 180
        8 => 270, // Rotate 90 CCW
        _ => 0,   // Normal (1) or other values
    }
}

fn read_exif_rotation(path: &Path) -> u32 {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return 0,
    };

    let mut reader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        if let exif::Value::Short(ref v) = field.value {
            if let Some(&orientation) = v.first() {
                return exif_orientation_to_degrees(orientation);
            }
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> ThumbnailManager {
        ThumbnailManager::new(&ThumbnailConfig {
            path: dir.to_path_buf(),
            size: 64,
            quality: 85,
        })
    }

    #[test]
    fn test_cache_path_is_stable() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let a = mgr.cache_path(Path::new("/photos/sunset.jpg"));
        let b = mgr.cache_path(Path::new("/photos/sunset.jpg"));
        let c = mgr.cache_path(Path::new("/other/sunset.jpg"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generate_rejects_non_image() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path());

        let src = dir.path().join("fake.jpg");
        std::fs::write(&src, b"not an image").unwrap();
        assert!(mgr.generate(&src).is_err());
        assert!(mgr.cached_path(&src).is_none());
    }

    #[test]
    fn test_orientation_mapping() {
        assert_eq!(exif_orientation_to_degrees(1), 0);
        assert_eq!(exif_orientation_to_degrees(3), 180);
        assert_eq!(exif_orientation_to_degrees(6), 90);
        assert_eq!(exif_orientation_to_degrees(8), 270);
    }
}
