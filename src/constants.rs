/// Application constants

pub const API_VERSION: &str = "v1";

// Board geometry (one player's half of the Stratego board)
pub const GRID_ROWS: usize = 4;
pub const GRID_COLS: usize = 10;
pub const GRID_CELLS: usize = GRID_ROWS * GRID_COLS;

// Single staging slot used while a submission is validated
pub const STAGING_SETUP_ID: i64 = 1;

// Transcription defaults (xAI vision model)
pub const DEFAULT_XAI_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_XAI_VISION_MODEL: &str = "grok-2-vision-1212";
pub const TRANSCRIPTION_TEMPERATURE: f64 = 0.2;
pub const TRANSCRIPTION_TIMEOUT_SECS: u64 = 60;
