use serde::Serialize;

use crate::{
    db::Database,
    error::Result,
    models::{GameDetails, Grid, RawGrid, SetupId},
};

use super::{
    duplicate_detector::DuplicateDetector,
    piece_consistency::check_piece_consistency,
    staging::{StagingArea, StagingSlot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessedSetup {
    pub setup_id: SetupId,
    pub record_id: i64,
    /// True when the grid was already on file and was not committed again.
    pub reused_existing: bool,
}

/// Setup Processor - validates, deduplicates and stores submitted setups
///
/// One call to [`SetupProcessor::process`] is one submission:
///
/// 1. shape check of the raw grid (nothing touched on failure)
/// 2. acquire the staging slot and allocate a candidate id
/// 3. stage the grid and run the consistency check on the staged copy
/// 4. look for a committed duplicate
/// 5. commit the grid (new setups only) and the game record in one transaction
/// 6. clear staging, on success and on failure alike
#[derive(Clone)]
pub struct SetupProcessor {
    db: Database,
    staging: StagingArea,
    detector: DuplicateDetector,
}

impl SetupProcessor {
    pub fn new(db: Database) -> Self {
        Self {
            staging: StagingArea::new(db.clone()),
            detector: DuplicateDetector::new(db.clone()),
            db,
        }
    }

    pub fn detector(&self) -> &DuplicateDetector {
        &self.detector
    }

    pub async fn process(&self, raw: &RawGrid, details: &GameDetails) -> Result<ProcessedSetup> {
        tracing::info!(
            opponent = %details.opponent_name,
            date_played = %details.date_played,
            result = %details.result,
            "Processing setup"
        );

        let grid = Grid::from_raw(raw).map_err(|e| {
            tracing::warn!("Rejected setup before staging: {}", e);
            e
        })?;

        // The slot also serializes id allocation through commit.
        let slot = self.staging.acquire().await;
        let outcome = self.run_staged(&slot, &grid, details).await;

        // A failed clear does not fail the submission: the grid and record
        // are already committed, and `Database::replace_staged_cells` deletes
        // every staged row before inserting, so leftovers never reach the
        // next consistency check.
        if let Err(e) = slot.clear_staged().await {
            tracing::error!("Failed to clear staging: {}", e);
        }
        drop(slot);

        match &outcome {
            Ok(processed) => tracing::info!(
                setup_id = %processed.setup_id,
                record_id = processed.record_id,
                reused_existing = processed.reused_existing,
                "Setup processed"
            ),
            Err(e) => tracing::warn!("Setup processing failed: {}", e),
        }
        outcome
    }

    async fn run_staged(
        &self,
        slot: &StagingSlot<'_>,
        grid: &Grid,
        details: &GameDetails,
    ) -> Result<ProcessedSetup> {
        let candidate = self.db.next_setup_id().await?;
        tracing::debug!(%candidate, "Candidate setup id allocated");

        slot.stage(grid).await?;

        let staged = slot.read_staged().await?;
        check_piece_consistency(staged.iter().map(|cell| cell.piece.as_str()))?;

        let duplicate = self.detector.find_duplicate(slot).await?;
        let (setup_id, reused_existing) = match duplicate {
            Some(existing) => (existing, true),
            None => (candidate, false),
        };

        let mut tx = self.db.pool().begin().await?;
        if !reused_existing {
            Database::commit_grid(&mut tx, setup_id, grid).await?;
        }
        let record_id = Database::commit_game_record(&mut tx, details, setup_id).await?;
        tx.commit().await?;

        Ok(ProcessedSetup {
            setup_id,
            record_id,
            reused_existing,
        })
    }
}
