//! Input-side pipeline stages.
//!
//! - **discovery**: Find image files in the raw input directory
//! - **validate**: Pre-decode checks (existence, size, magic bytes)
//! - **decode**: Load and decode images

pub mod decode;
pub mod discovery;
pub mod validate;

pub use decode::{DecodedImage, ImageDecoder};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use validate::Validator;
