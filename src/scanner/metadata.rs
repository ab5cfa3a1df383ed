use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Structured metadata extracted from an image file.
///
/// Serialized to JSON for the catalog's `exif_data` column. All fields are
/// optional; extraction is best-effort and partial results are normal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    // Image dimensions
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,

    // Camera info
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens: Option<String>,

    // Exposure settings
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<String>,
    pub iso: Option<i32>,

    // Date/time, ISO-8601
    pub date_taken: Option<String>,

    // GPS
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
}

fn exif_string(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    exif.get_field(tag, exif::In::PRIMARY)
        .map(|f| f.display_value().to_string().trim_matches('"').to_string())
}

fn exif_rational(exif: &exif::Exif, tag: exif::Tag) -> Option<f64> {
    if let Some(field) = exif.get_field(tag, exif::In::PRIMARY) {
        if let exif::Value::Rational(ref v) = field.value {
            if let Some(r) = v.first() {
                return Some(r.num as f64 / r.denom as f64);
            }
        }
    }
    None
}

/// Extract dimensions, format and EXIF fields from an image file.
///
/// Fails only when the file cannot be opened at all; unreadable or absent
/// EXIF segments simply leave fields unset.
pub fn extract_metadata(path: &Path) -> Result<ImageMetadata> {
    let mut metadata = ImageMetadata::default();

    if let Ok(reader) = image::ImageReader::open(path) {
        if let Some(format) = reader.format() {
            metadata.format = Some(format!("{:?}", format));
        }
    }

    // Open again since into_dimensions consumes the reader
    if let Ok(reader) = image::ImageReader::open(path) {
        if let Ok(dims) = reader.into_dimensions() {
            metadata.width = Some(dims.0);
            metadata.height = Some(dims.1);
        }
    }

    let file = File::open(path)?;
    let mut bufreader = BufReader::new(file);
    if let Ok(exif) = exif::Reader::new().read_from_container(&mut bufreader) {
        metadata.camera_make = exif_string(&exif, exif::Tag::Make);
        metadata.camera_model = exif_string(&exif, exif::Tag::Model);
        metadata.lens = exif_string(&exif, exif::Tag::LensModel);
        metadata.focal_length = exif_rational(&exif, exif::Tag::FocalLength);
        metadata.aperture = exif_rational(&exif, exif::Tag::FNumber);
        metadata.shutter_speed = exif_string(&exif, exif::Tag::ExposureTime);

        if let Some(field) = exif.get_field(exif::Tag::PhotographicSensitivity, exif::In::PRIMARY) {
            if let exif::Value::Short(ref v) = field.value {
                if let Some(&iso) = v.first() {
                    metadata.iso = Some(iso as i32);
                }
            }
        }

        if let Some(raw) = exif_string(&exif, exif::Tag::DateTimeOriginal) {
            metadata.date_taken = normalize_exif_datetime(&raw);
        }

        extract_gps(&exif, &mut metadata);
    }

    Ok(metadata)
}

/// EXIF stores "YYYY:MM:DD HH:MM:SS"; the catalog stores ISO-8601.
fn normalize_exif_datetime(raw: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn extract_gps(exif: &exif::Exif, metadata: &mut ImageMetadata) {
    let fields = (
        exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY),
    );

    if let (Some(lat_field), Some(lat_ref), Some(lon_field), Some(lon_ref)) = fields {
        if let (exif::Value::Rational(lat_vals), exif::Value::Rational(lon_vals)) =
            (&lat_field.value, &lon_field.value)
        {
            if lat_vals.len() >= 3 && lon_vals.len() >= 3 {
                let lat = dms_to_decimal(
                    lat_vals[0].num as f64 / lat_vals[0].denom as f64,
                    lat_vals[1].num as f64 / lat_vals[1].denom as f64,
                    lat_vals[2].num as f64 / lat_vals[2].denom as f64,
                );
                let lon = dms_to_decimal(
                    lon_vals[0].num as f64 / lon_vals[0].denom as f64,
                    lon_vals[1].num as f64 / lon_vals[1].denom as f64,
                    lon_vals[2].num as f64 / lon_vals[2].denom as f64,
                );

                let lat_ref_str = lat_ref.display_value().to_string();
                let lon_ref_str = lon_ref.display_value().to_string();

                metadata.gps_latitude = Some(if lat_ref_str.contains('S') { -lat } else { lat });
                metadata.gps_longitude = Some(if lon_ref_str.contains('W') { -lon } else { lon });
            }
        }
    }
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_exif_datetime() {
        assert_eq!(
            normalize_exif_datetime("2024:03:15 09:30:00").as_deref(),
            Some("2024-03-15T09:30:00")
        );
        assert_eq!(normalize_exif_datetime("garbage"), None);
    }

    #[test]
    fn test_dms_to_decimal() {
        let dec = dms_to_decimal(51.0, 30.0, 0.0);
        assert!((dec - 51.5).abs() < 1e-9);
    }

    #[test]
    fn test_extract_metadata_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"plain text").unwrap();

        // No dimensions, no EXIF, but not an error
        let meta = extract_metadata(&path).unwrap();
        assert!(meta.width.is_none());
        assert!(meta.date_taken.is_none());
    }
}
