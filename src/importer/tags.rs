//! Sidecar tag import.
//!
//! Captioning tools drop a `.txt` next to each image, either as a
//! comma/line-separated tag list or as one long free-text caption. The
//! importer reads the sidecar, classifies the content into one of three
//! tiers (simple / normal / detailed) and attaches it to the photo record,
//! with translations supplied by a pluggable collaborator.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::db::{Database, TagUpdate};

/// Sidecar content longer than this is treated as a single free-text
/// caption rather than a tag list, preserving descriptive integrity.
const CAPTION_THRESHOLD: usize = 50;

/// The three tag tiers a sidecar can land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTier {
    Simple,
    Normal,
    Detailed,
}

/// How the target tier is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierSelection {
    /// Pick by content length and word count.
    #[default]
    Auto,
    Fixed(TagTier),
}

#[derive(Debug, Clone, Default)]
pub struct TagImportOptions {
    pub tier: TierSelection,
    /// Empty all tiers before writing the new tags.
    pub clear_existing: bool,
    /// Merge with existing tags instead of replacing them.
    pub append: bool,
}

impl TagImportOptions {
    pub fn appending() -> Self {
        Self {
            append: true,
            ..Default::default()
        }
    }
}

/// Translation collaborator. Failure or absence falls back to identity
/// mappings; it can never fail a tag import.
pub trait Translator: Send + Sync {
    fn translate(&self, tags: &[String]) -> Result<HashMap<String, String>>;
}

/// Built-in dictionary translator used when no external service is wired up.
pub struct StaticTranslator {
    dictionary: HashMap<&'static str, &'static str>,
}

impl StaticTranslator {
    pub fn new() -> Self {
        let dictionary = HashMap::from([
            ("portrait", "人像"),
            ("landscape", "风景"),
            ("nature", "自然"),
            ("city", "城市"),
            ("architecture", "建筑"),
            ("street", "街道"),
            ("people", "人物"),
            ("animal", "动物"),
            ("flower", "花朵"),
            ("tree", "树木"),
            ("mountain", "山脉"),
            ("sea", "海洋"),
            ("sky", "天空"),
            ("sunset", "日落"),
            ("sunrise", "日出"),
            ("night", "夜晚"),
            ("colorful", "彩色"),
            ("vintage", "复古"),
            ("abstract", "抽象"),
            ("minimalist", "极简"),
        ]);
        Self { dictionary }
    }
}

impl Default for StaticTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for StaticTranslator {
    fn translate(&self, tags: &[String]) -> Result<HashMap<String, String>> {
        let mut translations = HashMap::new();
        for tag in tags {
            let lower = tag.to_lowercase();
            let translated = self
                .dictionary
                .get(lower.as_str())
                .copied()
                .or_else(|| {
                    // Partial keyword match, e.g. "sunset glow" -> sunset
                    self.dictionary
                        .iter()
                        .find(|(key, _)| lower.contains(*key))
                        .map(|(_, value)| *value)
                });
            translations.insert(
                tag.clone(),
                translated.map(str::to_string).unwrap_or_else(|| tag.clone()),
            );
        }
        Ok(translations)
    }
}

/// The sidecar for a photo: same directory, same stem, `.txt` extension.
pub fn find_sidecar(photo_path: &Path) -> Option<PathBuf> {
    let stem = photo_path.file_stem()?;
    let candidate = photo_path.with_file_name(format!("{}.txt", stem.to_string_lossy()));
    candidate.is_file().then_some(candidate)
}

/// Split sidecar content into tag strings.
///
/// Long content is kept whole as one caption tag. Short content is split on
/// lines, with `#` comment lines dropped and comma-separated entries split
/// further.
pub fn parse_sidecar_content(content: &str) -> Vec<String> {
    let content = content.trim();
    if content.is_empty() {
        return Vec::new();
    }

    if content.len() > CAPTION_THRESHOLD {
        return vec![content.to_string()];
    }

    let mut tags = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for tag in line.split(',') {
            let tag = tag.trim();
            if !tag.is_empty() {
                tags.push(tag.to_string());
            }
        }
    }
    tags
}

/// Tier heuristic over the joined tag content: short and few words reads as
/// keyword tags, long content as a detailed description.
pub fn classify_tier(tags: &[String]) -> TagTier {
    let combined = tags.join(" ");
    let length = combined.chars().count();
    let words = combined.split_whitespace().count();

    if length < 100 && words <= 10 {
        TagTier::Simple
    } else if length > 300 || words > 20 {
        TagTier::Detailed
    } else {
        TagTier::Normal
    }
}

fn resolve_tier(selection: TierSelection, tags: &[String]) -> TagTier {
    match selection {
        TierSelection::Auto => classify_tier(tags),
        TierSelection::Fixed(tier) => tier,
    }
}

fn translate_or_identity(translator: &dyn Translator, tags: &[String]) -> HashMap<String, String> {
    match translator.translate(tags) {
        Ok(map) => map,
        Err(e) => {
            warn!("tag translation failed, keeping originals: {e:#}");
            tags.iter().map(|t| (t.clone(), t.clone())).collect()
        }
    }
}

fn build_update(
    tier: TagTier,
    tags: Vec<String>,
    translations: HashMap<String, String>,
) -> TagUpdate {
    let mut update = TagUpdate {
        tags: tags.clone(),
        ..Default::default()
    };
    match tier {
        TagTier::Simple => update.simple_tags = tags,
        TagTier::Normal => update.normal_tags = tags,
        TagTier::Detailed => update.detailed_tags = tags,
    }
    for (tag, translation) in translations {
        update
            .tag_translations
            .insert(tag, serde_json::Value::String(translation));
    }
    update
}

/// Read the sidecar for a photo and produce the insert-time tag payload.
/// Used by the batch pipeline so new photos land with their tags in the
/// initial insert.
pub(crate) fn sidecar_tags(
    photo_path: &Path,
    options: &TagImportOptions,
    translator: &dyn Translator,
) -> Option<TagUpdate> {
    let sidecar = find_sidecar(photo_path)?;
    let content = match std::fs::read_to_string(&sidecar) {
        Ok(content) => content,
        Err(e) => {
            warn!("cannot read tag file {}: {e}", sidecar.display());
            return None;
        }
    };

    let tags = parse_sidecar_content(&content);
    if tags.is_empty() {
        return None;
    }

    let tier = resolve_tier(options.tier, &tags);
    let translations = translate_or_identity(translator, &tags);
    debug!(
        "sidecar tags for {}: {} tags, tier {tier:?}",
        photo_path.display(),
        tags.len()
    );
    Some(build_update(tier, tags, translations))
}

/// Attach sidecar tags to an already catalogued photo, honoring the
/// clear/append options. Missing or empty sidecars are a no-op.
pub fn import_tags_for_photo(
    db: &Database,
    translator: &dyn Translator,
    photo_id: i64,
    photo_path: &Path,
    options: &TagImportOptions,
) -> Result<()> {
    let Some(sidecar) = find_sidecar(photo_path) else {
        debug!("no tag file for {}", photo_path.display());
        return Ok(());
    };
    let content = std::fs::read_to_string(&sidecar)?;
    let tags = parse_sidecar_content(&content);
    if tags.is_empty() {
        warn!("tag file is empty: {}", sidecar.display());
        return Ok(());
    }

    let tier = resolve_tier(options.tier, &tags);
    let translations = translate_or_identity(translator, &tags);
    let mut update = build_update(tier, tags, translations);

    if options.append && !options.clear_existing {
        if let Some(photo) = db.get_photo(photo_id)? {
            merge_existing(&mut update, &photo);
        }
    }

    db.set_photo_tags(photo_id, &update)?;
    Ok(())
}

/// Prepend the photo's current tags to the update, deduplicating.
fn merge_existing(update: &mut TagUpdate, photo: &crate::db::PhotoRecord) {
    let merge = |current: &str, incoming: &mut Vec<String>| {
        let mut merged: Vec<String> =
            serde_json::from_str::<Vec<String>>(current).unwrap_or_default();
        for tag in incoming.drain(..) {
            if !merged.contains(&tag) {
                merged.push(tag);
            }
        }
        *incoming = merged;
    };

    merge(&photo.tags, &mut update.tags);
    merge(&photo.simple_tags, &mut update.simple_tags);
    merge(&photo.normal_tags, &mut update.normal_tags);
    merge(&photo.detailed_tags, &mut update.detailed_tags);

    if let Ok(serde_json::Value::Object(existing)) =
        serde_json::from_str::<serde_json::Value>(&photo.tag_translations)
    {
        for (tag, translation) in existing {
            update.tag_translations.entry(tag).or_insert(translation);
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
    fn test_parse_tag_list() {
        let tags = parse_sidecar_content("sunset, beach\n# note\nmountain");
        assert_eq!(tags, vec!["sunset", "beach", "mountain"]);
    }

    #[test]
    fn test_parse_long_caption_kept_whole() {
        let caption = "a quiet fishing village at dawn, boats resting on glassy water";
        let tags = parse_sidecar_content(caption);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0], caption);
    }

    #[test]
    fn test_parse_empty_content() {
        assert!(parse_sidecar_content("  \n ").is_empty());
    }

    #[test]
    fn test_classify_tier_boundaries() {
        let short = vec!["sunset".to_string(), "beach".to_string()];
        assert_eq!(classify_tier(&short), TagTier::Simple);

        let medium = vec![
            "a moody autumn forest scene with scattered golden leaves covering a narrow \
             winding path under tall bare trees"
                .to_string(),
        ];
        assert_eq!(classify_tier(&medium), TagTier::Normal);

        let detailed = vec!["word".to_string(); 25];
        assert_eq!(classify_tier(&detailed), TagTier::Detailed);
    }

    #[test]
    fn test_static_translator() {
        let translator = StaticTranslator::new();
        let tags = vec![
            "portrait".to_string(),
            "sunset glow".to_string(),
            "untranslatable-thing".to_string(),
        ];
        let map = translator.translate(&tags).unwrap();
        assert_eq!(map["portrait"], "人像");
        assert_eq!(map["sunset glow"], "日落");
        assert_eq!(map["untranslatable-thing"], "untranslatable-thing");
    }

    #[test]
    fn test_find_sidecar() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"img").unwrap();

        assert!(find_sidecar(&photo).is_none());
        fs::write(dir.path().join("a.txt"), "sunset").unwrap();
        assert_eq!(find_sidecar(&photo).unwrap(), dir.path().join("a.txt"));
    }

    #[test]
    fn test_import_with_sidecar_auto_tier() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"img-bytes").unwrap();
        fs::write(dir.path().join("a.txt"), "sunset, beach").unwrap();

        let options = TagImportOptions::appending();
        let id = importer
            .import_photo_with_tags(&photo, Some(&options))
            .unwrap()
            .unwrap();

        let record = importer.db().get_photo(id).unwrap().unwrap();
        let simple: Vec<String> = serde_json::from_str(&record.simple_tags).unwrap();
        assert_eq!(simple, vec!["sunset", "beach"]);
        assert!(record.tag_translations.contains("日落"));
    }

    #[test]
    fn test_append_deduplicates() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"img-bytes").unwrap();
        fs::write(dir.path().join("a.txt"), "sunset, beach").unwrap();

        let options = TagImportOptions::appending();
        let id = importer
            .import_photo_with_tags(&photo, Some(&options))
            .unwrap()
            .unwrap();

        // Re-importing the same sidecar must not duplicate tags
        import_tags_for_photo(
            importer.db(),
            &StaticTranslator::new(),
            id,
            &photo,
            &options,
        )
        .unwrap();

        let record = importer.db().get_photo(id).unwrap().unwrap();
        let simple: Vec<String> = serde_json::from_str(&record.simple_tags).unwrap();
        assert_eq!(simple, vec!["sunset", "beach"]);
    }

    #[test]
    fn test_replace_mode_overwrites() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"img-bytes").unwrap();
        fs::write(dir.path().join("a.txt"), "sunset").unwrap();

        let id = importer
            .import_photo_with_tags(&photo, Some(&TagImportOptions::appending()))
            .unwrap()
            .unwrap();

        fs::write(dir.path().join("a.txt"), "mountain").unwrap();
        let replace = TagImportOptions {
            append: false,
            ..Default::default()
        };
        import_tags_for_photo(
            importer.db(),
            &StaticTranslator::new(),
            id,
            &photo,
            &replace,
        )
        .unwrap();

        let record = importer.db().get_photo(id).unwrap().unwrap();
        let simple: Vec<String> = serde_json::from_str(&record.simple_tags).unwrap();
        assert_eq!(simple, vec!["mountain"]);
    }

    #[test]
    fn test_fixed_tier_selection() {
        let dir = tempdir().unwrap();
        let importer = importer_in(dir.path());

        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"img-bytes").unwrap();
        fs::write(dir.path().join("a.txt"), "sunset").unwrap();

        let options = TagImportOptions {
            tier: TierSelection::Fixed(TagTier::Detailed),
            ..Default::default()
        };
        let id = importer
            .import_photo_with_tags(&photo, Some(&options))
            .unwrap()
            .unwrap();

        let record = importer.db().get_photo(id).unwrap().unwrap();
        let detailed: Vec<String> = serde_json::from_str(&record.detailed_tags).unwrap();
        assert_eq!(detailed, vec!["sunset"]);
        let simple: Vec<String> = serde_json::from_str(&record.simple_tags).unwrap();
        assert!(simple.is_empty());
    }
}
