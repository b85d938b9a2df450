use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    constants::STAGING_SETUP_ID,
    db::Database,
    error::Result,
    models::{Grid, GridCell},
};

/// Owner of the single staging slot. Only one submission may hold the
/// slot at a time; everything done through a [`StagingSlot`] happens under
/// that exclusion.
#[derive(Clone)]
pub struct StagingArea {
    db: Database,
    lock: Arc<Mutex<()>>,
}

impl StagingArea {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Waits until no other submission holds the slot.
    pub async fn acquire(&self) -> StagingSlot<'_> {
        let guard = self.lock.lock().await;
        tracing::debug!(staging_id = STAGING_SETUP_ID, "Staging slot acquired");
        StagingSlot {
            db: &self.db,
            _guard: guard,
        }
    }
}

/// Exclusive handle on the staging slot, released on drop.
pub struct StagingSlot<'a> {
    db: &'a Database,
    _guard: MutexGuard<'a, ()>,
}

impl StagingSlot<'_> {
    pub fn id(&self) -> i64 {
        STAGING_SETUP_ID
    }

    /// Replaces whatever is staged with the cells of `grid`.
    pub async fn stage(&self, grid: &Grid) -> Result<()> {
        self.db.replace_staged_cells(grid).await?;
        tracing::debug!(staging_id = self.id(), "Grid staged");
        Ok(())
    }

    pub async fn read_staged(&self) -> Result<Vec<GridCell>> {
        self.db.staged_cells().await
    }

    /// Removes all staged cells. Safe to call on an empty slot.
    pub async fn clear_staged(&self) -> Result<()> {
        let removed = self.db.clear_staged_cells().await?;
        tracing::debug!(staging_id = self.id(), removed, "Staging cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::setup::fixtures::*;
    use crate::services::piece_consistency::check_piece_consistency;
    use std::time::Duration;

    fn grid(raw: &crate::models::RawGrid) -> Grid {
        Grid::from_raw(raw).unwrap()
    }

    #[tokio::test]
    async fn stage_then_read_returns_forty_cells() {
        let staging = StagingArea::new(Database::in_memory().await);
        let slot = staging.acquire().await;
        let expected = grid(&canonical_raw_grid());

        slot.stage(&expected).await.unwrap();
        let staged = slot.read_staged().await.unwrap();

        assert_eq!(staged, expected.cells().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stage_replaces_previous_content() {
        let staging = StagingArea::new(Database::in_memory().await);
        let slot = staging.acquire().await;

        slot.stage(&grid(&canonical_raw_grid())).await.unwrap();
        slot.stage(&grid(&alternate_raw_grid())).await.unwrap();

        let staged = slot.read_staged().await.unwrap();
        assert_eq!(staged.len(), 40);
        assert_eq!(staged, grid(&alternate_raw_grid()).cells().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let db = Database::in_memory().await;
        let staging = StagingArea::new(db.clone());
        let slot = staging.acquire().await;

        slot.stage(&grid(&canonical_raw_grid())).await.unwrap();
        slot.clear_staged().await.unwrap();
        assert!(slot.read_staged().await.unwrap().is_empty());

        slot.clear_staged().await.unwrap();
        assert!(slot.read_staged().await.unwrap().is_empty());
        assert_eq!(db.count_rows("staged_setup").await, 0);
    }

    #[tokio::test]
    async fn failed_grid_does_not_leak_into_next_check() {
        let staging = StagingArea::new(Database::in_memory().await);
        let slot = staging.acquire().await;

        let mut broken = canonical_raw_grid();
        broken.get_mut("1").unwrap()[0] = "X".to_string();
        slot.stage(&grid(&broken)).await.unwrap();
        let staged = slot.read_staged().await.unwrap();
        assert!(check_piece_consistency(staged.iter().map(|c| c.piece.as_str())).is_err());

        slot.stage(&grid(&alternate_raw_grid())).await.unwrap();
        let staged = slot.read_staged().await.unwrap();
        assert!(check_piece_consistency(staged.iter().map(|c| c.piece.as_str())).is_ok());
    }

    #[tokio::test]
    async fn slot_is_exclusive_until_dropped() {
        let staging = StagingArea::new(Database::in_memory().await);
        let slot = staging.acquire().await;

        let contender = staging.clone();
        let waiting = tokio::spawn(async move {
            let _slot = contender.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(slot);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("second acquire completes after release")
            .unwrap();
    }
}
