//! AI-generation metadata extraction.
//!
//! Generators embed their parameters in image text blocks: Stable Diffusion
//! WebUI writes a "parameters" blob ("Steps: 30, Sampler: ..., Seed: ...")
//! that commonly ends up in the EXIF UserComment of exported JPEGs, and many
//! tools encode the seed and render size into the filename. Extraction is
//! strictly best-effort and never fails: an unreadable file yields the
//! all-default structure.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Generation metadata recovered from an image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiMetadata {
    pub is_ai_generated: bool,
    pub generation_software: String,
    pub model_name: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub sampler: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: u64,
    /// Render size as reported by the generator, e.g. "1024x1024".
    pub size: String,
    /// Fields we recognized but do not model, kept for forward compatibility.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AiMetadata {
    fn has_generation_evidence(&self) -> bool {
        !self.generation_software.is_empty()
            || !self.model_name.is_empty()
            || !self.positive_prompt.is_empty()
            || !self.sampler.is_empty()
    }
}

/// Extract AI-generation metadata from an image file. Never fails.
pub fn extract(path: &Path) -> AiMetadata {
    let mut metadata = AiMetadata::default();

    if let Ok(file) = File::open(path) {
        let mut reader = BufReader::new(file);
        if let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) {
            for tag in [exif::Tag::UserComment, exif::Tag::ImageDescription] {
                if let Some(field) = exif.get_field(tag, exif::In::PRIMARY) {
                    let text = field.display_value().to_string();
                    if looks_like_generation_parameters(&text) {
                        parse_generation_parameters(&text, &mut metadata);
                        break;
                    }
                }
            }
        }
    } else {
        debug!("cannot open {} for AI metadata", path.display());
    }

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        parse_filename_hints(name, &mut metadata);
    }

    metadata.is_ai_generated = metadata.has_generation_evidence();
    metadata
}

/// A parameter blob carries at least one of the WebUI key markers.
fn looks_like_generation_parameters(text: &str) -> bool {
    ["Steps:", "Sampler:", "CFG scale:", "Seed:", "Model:"]
        .iter()
        .any(|marker| text.contains(marker))
}

/// Parse a WebUI-style parameter blob.
///
/// Layout: prompt lines, an optional "Negative prompt:" line, then one line
/// of comma-separated "Key: value" settings.
pub fn parse_generation_parameters(text: &str, metadata: &mut AiMetadata) {
    metadata.generation_software = "Stable Diffusion WebUI".to_string();

    let mut positive = String::new();
    let mut negative = String::new();
    let mut in_negative = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Negative prompt:") {
            in_negative = true;
            negative.push_str(rest.trim());
        } else if line.contains("Steps:") {
            parse_settings_line(line, metadata);
        } else if in_negative {
            negative.push(' ');
            negative.push_str(line);
        } else {
            if !positive.is_empty() {
                positive.push(' ');
            }
            positive.push_str(line);
        }
    }

    metadata.positive_prompt = positive.trim().to_string();
    metadata.negative_prompt = negative.trim().to_string();
}

fn parse_settings_line(line: &str, metadata: &mut AiMetadata) {
    for part in line.split(',') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "Steps" => metadata.steps = value.parse().unwrap_or(0),
            "Sampler" => metadata.sampler = value.to_string(),
            "CFG scale" => metadata.cfg_scale = value.parse().unwrap_or(0.0),
            "Seed" => metadata.seed = value.parse().unwrap_or(0),
            "Model" => metadata.model_name = value.to_string(),
            "Size" => metadata.size = value.to_string(),
            _ => {
                metadata
                    .extra
                    .insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }
}

/// Pull a seed (long digit run) and render size (WxH) out of a filename.
fn parse_filename_hints(filename: &str, metadata: &mut AiMetadata) {
    if metadata.seed == 0 {
        if let Some(run) = longest_digit_run(filename) {
            if run.len() >= 10 {
                metadata.seed = run.parse().unwrap_or(0);
            }
        }
    }

    if metadata.size.is_empty() {
        if let Some(size) = find_dimensions_token(filename) {
            metadata.size = size;
        }
    }
}

fn longest_digit_run(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .max_by_key(|s| s.len())
        .map(|s| s.to_string())
}

/// Find a "123x456" style token.
fn find_dimensions_token(text: &str) -> Option<String> {
    for token in text.split(|c: char| !(c.is_ascii_digit() || c == 'x')) {
        if let Some((w, h)) = token.split_once('x') {
            if !w.is_empty()
                && !h.is_empty()
                && w.chars().all(|c| c.is_ascii_digit())
                && h.chars().all(|c| c.is_ascii_digit())
            {
                return Some(token.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEBUI_BLOB: &str = "a castle on a hill, dramatic lighting\n\
        Negative prompt: blurry, low quality\n\
        Steps: 30, Sampler: DPM++ 2M Karras, CFG scale: 7.5, Seed: 3141592653, \
        Size: 1024x768, Model: dreamshaper_8, Clip skip: 2";

    #[test]
    fn test_parse_webui_parameters() {
        let mut meta = AiMetadata::default();
        parse_generation_parameters(WEBUI_BLOB, &mut meta);

        assert_eq!(meta.generation_software, "Stable Diffusion WebUI");
        assert_eq!(meta.positive_prompt, "a castle on a hill, dramatic lighting");
        assert_eq!(meta.negative_prompt, "blurry, low quality");
        assert_eq!(meta.steps, 30);
        assert_eq!(meta.sampler, "DPM++ 2M Karras");
        assert!((meta.cfg_scale - 7.5).abs() < 1e-9);
        assert_eq!(meta.seed, 3141592653);
        assert_eq!(meta.size, "1024x768");
        assert_eq!(meta.model_name, "dreamshaper_8");
        assert_eq!(
            meta.extra.get("Clip skip"),
            Some(&serde_json::Value::String("2".to_string()))
        );
    }

    #[test]
    fn test_filename_hints() {
        let mut meta = AiMetadata::default();
        parse_filename_hints("render_3141592653_512x512.png", &mut meta);
        assert_eq!(meta.seed, 3141592653);
        assert_eq!(meta.size, "512x512");

        // Short digit runs are not seeds
        let mut meta = AiMetadata::default();
        parse_filename_hints("IMG_2024.jpg", &mut meta);
        assert_eq!(meta.seed, 0);
    }

    #[test]
    fn test_extract_plain_file_is_not_ai() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holiday.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let meta = extract(&path);
        assert!(!meta.is_ai_generated);
        assert!(meta.generation_software.is_empty());
    }

    #[test]
    fn test_generation_evidence_flags_ai() {
        let mut meta = AiMetadata::default();
        parse_generation_parameters(WEBUI_BLOB, &mut meta);
        assert!(meta.has_generation_evidence());
    }
}
