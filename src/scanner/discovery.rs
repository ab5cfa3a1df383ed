use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A directory containing at least `min_images` catalog-eligible files.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    pub path: PathBuf,
    pub name: String,
    pub image_count: usize,
}

fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        }
        None => false,
    }
}

/// Enumerate image files under `root`, matching the extension allow-list.
///
/// Symlinks are not followed. Results are sorted by path so repeated scans
/// of an unchanged tree produce identical orderings.
pub fn discover_images(root: &Path, recursive: bool, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("directory not found: {}", root.display());
    }

    let mut walker = WalkDir::new(root).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut images = Vec::new();
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && has_supported_extension(path, extensions) {
            images.push(path.to_path_buf());
        }
    }

    images.sort();

    Ok(images)
}

/// Survey `root` for directories holding at least `min_images` image files.
///
/// Hidden directories are skipped. Results are sorted by image count,
/// largest first. This feeds directory-picker UX; the import pipeline does
/// not depend on it.
pub fn find_image_directories(
    root: &Path,
    min_images: usize,
    extensions: &[String],
) -> Result<Vec<ImageDirectory>> {
    if !root.is_dir() {
        bail!("directory not found: {}", root.display());
    }

    let mut result = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|e| e.ok())
    {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let image_count = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let p = e.path();
                    p.is_file() && has_supported_extension(&p, extensions)
                })
                .count(),
            Err(_) => continue,
        };

        if image_count >= min_images {
            result.push(ImageDirectory {
                path: dir.to_path_buf(),
                name: dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                image_count,
            });
        }
    }

    result.sort_by(|a, b| b.image_count.cmp(&a.image_count));

    Ok(result)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
