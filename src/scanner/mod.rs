pub mod ai_metadata;
pub mod discovery;
pub mod hashing;
pub mod metadata;
pub mod thumbnails;

pub use ai_metadata::AiMetadata;
pub use discovery::{discover_images, find_image_directories, ImageDirectory};
pub use hashing::hash_file;
pub use metadata::ImageMetadata;
pub use thumbnails::ThumbnailManager;
