// All service modules
pub mod duplicate_detector;
pub mod piece_consistency;
pub mod position_analysis;
pub mod setup_processor;
pub mod staging;

// Re-export for convenience
pub use position_analysis::PositionAnalysisService;
pub use setup_processor::{ProcessedSetup, SetupProcessor};
