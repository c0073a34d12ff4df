//! Domain model and pure media-timing logic for the reel pipeline.

pub mod caption;
pub mod composition;
pub mod error;
pub mod ffmpeg;
pub mod prompt;
pub mod script;
pub mod stage;
pub mod tempo;
pub mod types;
pub mod voice;
