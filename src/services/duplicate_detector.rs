use crate::{
    db::Database,
    error::Result,
    models::{Grid, SetupId, SimilarityScore},
};

use super::staging::StagingSlot;

/// Compares grids against the committed history.
#[derive(Clone)]
pub struct DuplicateDetector {
    db: Database,
}

impl DuplicateDetector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Committed setup equal to the staged grid on all 40 cells, if any.
    /// When several match, the lowest id wins.
    pub async fn find_duplicate(&self, staged: &StagingSlot<'_>) -> Result<Option<SetupId>> {
        let duplicate = self.db.find_duplicate_of_staged().await?;
        match duplicate {
            Some(setup_id) => {
                tracing::info!(staging_id = staged.id(), %setup_id, "Staged grid matches committed setup")
            }
            None => tracing::debug!(staging_id = staged.id(), "No committed setup matches staged grid"),
        }
        Ok(duplicate)
    }

    /// Matching-cell count against every committed setup, most similar
    /// first. Informational only; commits never depend on it.
    pub async fn similarity_scores(&self, grid: &Grid) -> Result<Vec<SimilarityScore>> {
        let committed = self.db.committed_grids().await?;

        let mut scores: Vec<SimilarityScore> = committed
            .iter()
            .map(|setup| SimilarityScore::new(setup.setup_id, grid.matching_cells(&setup.cells)))
            .collect();
        scores.sort_by(|a, b| {
            b.matching_cells
                .cmp(&a.matching_cells)
                .then(a.setup_id.cmp(&b.setup_id))
        });

        Ok(scores)
    }
}
