//! Interactive-thumbnail artifacts: recognising artifact uploads, moving them
//! onto their item, and purging them.

pub mod attachment;
pub mod reference;

pub use attachment::ArtifactAttachmentManager;
pub use reference::{THUMBNAIL_REFERENCE_KEY, requests_interactive_thumbnail, thumbnail_reference};
