//! Photo catalog ingestion and deduplication engine.
//!
//! The engine identifies photos by the SHA-256 digest of their bytes, so
//! copies, moves and renames performed outside the application are absorbed
//! as path updates instead of duplicate catalog rows. It is embedded as a
//! library by the surrounding application; there is no CLI or wire protocol.
//!
//! The main entry point is [`PhotoImporter`], which coordinates discovery,
//! hashing, metadata and thumbnail extraction, and persistence into the
//! SQLite catalog ([`Database`]).

pub mod config;
pub mod db;
pub mod importer;
pub mod logging;
pub mod scanner;

pub use config::Config;
pub use db::{CatalogError, Database, PhotoRecord};
pub use importer::{
    BatchOptions, BatchSummary, ImportSummary, PhotoImporter, RecoveryReport, TagImportOptions,
    TagTier, TierSelection, Translator,
};
pub use scanner::{discover_images, find_image_directories, ImageDirectory, ImageMetadata};
