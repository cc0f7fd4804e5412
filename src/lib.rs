pub mod analysis;
pub mod audio;
pub mod audio_api;
pub mod config;
pub mod error;
pub mod loader;
pub mod middle;
pub mod pipeline;
pub mod shared;
pub mod tui;

pub use error::{Error, Result};
pub use middle::Middle;
pub use pipeline::{
    Mark, MarkError, MarkId, MarkStore, MetadataField, Selection, SessionState, Settings, Track,
    TrackMetadata,
};
pub use shared::{DisplayState, InputEvent, PlayMode};
