// src/api/mod.rs

pub mod health;
pub mod opponents;
pub mod positions;
pub mod setups;

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::integrations::{SetupTranscriber, XaiVisionClient};
use crate::services::SetupProcessor;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub processor: Arc<SetupProcessor>,
    pub transcriber: Arc<dyn SetupTranscriber>,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        let transcriber: Arc<dyn SetupTranscriber> = Arc::new(XaiVisionClient::from_config(&config));
        Self::with_transcriber(db, config, transcriber)
    }

    pub fn with_transcriber(
        db: Database,
        config: Config,
        transcriber: Arc<dyn SetupTranscriber>,
    ) -> Self {
        Self {
            processor: Arc::new(SetupProcessor::new(db.clone())),
            db,
            transcriber,
            config,
        }
    }
}
