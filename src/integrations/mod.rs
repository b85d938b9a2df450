pub mod xai_vision;

pub use xai_vision::{SetupTranscriber, XaiVisionClient};
