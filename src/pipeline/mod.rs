pub mod marks;
pub mod persistence;
pub mod selection;
pub mod session;
pub mod track;

pub use marks::{Mark, MarkError, MarkId, MarkRecord, MarkStore};
pub use selection::Selection;
pub use session::{SessionState, Settings};
pub use track::{MetadataField, Track, TrackMetadata};
