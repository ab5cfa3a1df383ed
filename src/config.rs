use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_image_extensions")]
    pub supported_extensions: Vec<String>,

    /// Worker pool size for the batch import phases.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Number of new files handed to the worker pool per slice.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_generate_thumbnails")]
    pub generate_thumbnails: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_cache_path")]
    pub path: PathBuf,

    #[serde(default = "default_thumb_size")]
    pub size: u32,

    /// JPEG quality for cached thumbnails (1-100).
    #[serde(default = "default_thumb_quality")]
    pub quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Directories searched (recursively) when relocating missing files.
    #[serde(default = "default_search_roots")]
    pub search_roots: Vec<PathBuf>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("picvault")
        .join("picvault.db")
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "bmp".to_string(),
        "tiff".to_string(),
        "webp".to_string(),
    ]
}

fn default_max_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    50
}

fn default_generate_thumbnails() -> bool {
    true
}

fn default_thumb_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("picvault/thumbnails")
}

fn default_thumb_size() -> u32 {
    256
}

fn default_thumb_quality() -> u8 {
    85
}

fn default_search_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = [
        dirs::picture_dir(),
        dirs::desktop_dir(),
        dirs::download_dir(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if let Some(home) = dirs::home_dir() {
        roots.push(home.join("Photos"));
    }
    roots
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            supported_extensions: default_image_extensions(),
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            generate_thumbnails: default_generate_thumbnails(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            path: default_thumb_cache_path(),
            size: default_thumb_size(),
            quality: default_thumb_quality(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            search_roots: default_search_roots(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            import: ImportConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("picvault")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// True when the extension (without dot) is on the import allow-list.
    pub fn is_supported_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.import
            .supported_extensions
            .iter()
            .any(|e| e.to_lowercase() == ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.import.max_workers, config.import.max_workers);
        assert_eq!(parsed.thumbnails.size, config.thumbnails.size);
    }

    #[test]
    fn test_supported_extension_case_insensitive() {
        let config = Config::default();
        assert!(config.is_supported_extension("JPG"));
        assert!(config.is_supported_extension("jpeg"));
        assert!(!config.is_supported_extension("txt"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("db_path = \"/tmp/cat.db\"").unwrap();
        assert_eq!(parsed.db_path, PathBuf::from("/tmp/cat.db"));
        assert_eq!(parsed.import.batch_size, 50);
        assert!(parsed.import.generate_thumbnails);
    }
}
