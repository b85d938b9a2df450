use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool,
};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{
    config::Config,
    constants::{GRID_CELLS, STAGING_SETUP_ID},
    error::{AppError, Result},
    models::*,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// One committed cell together with the setup it belongs to.
#[derive(Debug, FromRow)]
struct SetupCellRow {
    setup_id: i64,
    row: i64,
    col: i64,
    piece: String,
}

// Rows must arrive ordered by setup_id.
fn group_cells(rows: Vec<SetupCellRow>) -> Vec<CommittedGrid> {
    let mut grids: Vec<CommittedGrid> = Vec::new();
    for row in rows {
        let cell = GridCell {
            row: row.row,
            col: row.col,
            piece: row.piece,
        };
        match grids.last_mut() {
            Some(grid) if grid.setup_id.0 == row.setup_id => grid.cells.push(cell),
            _ => grids.push(CommittedGrid {
                setup_id: SetupId(row.setup_id),
                cells: vec![cell],
            }),
        }
    }
    grids
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ==================== COMMITTED SETUP QUERIES ====================
impl Database {
    /// `max(setup_id) + 1`, or 1 for an empty store. Callers serialize
    /// allocation and commit themselves.
    pub async fn next_setup_id(&self) -> Result<SetupId> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(setup_id) FROM game_setups")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.map(|id| SetupId(id).next()).unwrap_or(SetupId::FIRST))
    }

    /// Inserts the 40 cells of `grid` under a fresh id. Runs on the caller's
    /// connection so it can share a transaction with the game record.
    pub async fn commit_grid(
        conn: &mut SqliteConnection,
        setup_id: SetupId,
        grid: &Grid,
    ) -> Result<()> {
        for cell in grid.cells() {
            sqlx::query("INSERT INTO game_setups (setup_id, row, col, piece) VALUES (?, ?, ?, ?)")
                .bind(setup_id.0)
                .bind(cell.row)
                .bind(cell.col)
                .bind(&cell.piece)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Inserts one game record referencing `setup_id`. Returns the record id.
    pub async fn commit_game_record(
        conn: &mut SqliteConnection,
        details: &GameDetails,
        setup_id: SetupId,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO game_records
                (setup_id, date_played, opponent_id, opponent_name, result, moves, noob_killer)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(setup_id.0)
        .bind(details.date_played)
        .bind(details.opponent_id)
        .bind(&details.opponent_name)
        .bind(details.result.as_str())
        .bind(i64::from(details.moves))
        .bind(details.noob_killer)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Lowest committed setup whose 40 cells all equal the staged cells.
    pub async fn find_duplicate_of_staged(&self) -> Result<Option<SetupId>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT gs.setup_id
             FROM game_setups gs
             JOIN staged_setup ss
               ON gs.row = ss.row AND gs.col = ss.col AND gs.piece = ss.piece
             WHERE ss.staging_id = ?
             GROUP BY gs.setup_id
             HAVING COUNT(*) = ?
             ORDER BY gs.setup_id ASC
             LIMIT 1",
        )
        .bind(STAGING_SETUP_ID)
        .bind(GRID_CELLS as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(SetupId))
    }

    pub async fn committed_grids(&self) -> Result<Vec<CommittedGrid>> {
        let rows = sqlx::query_as::<_, SetupCellRow>(
            "SELECT setup_id, row, col, piece FROM game_setups ORDER BY setup_id, row, col",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(group_cells(rows))
    }

    /// Cells for each requested id, in request order. Unknown ids are skipped.
    pub async fn cells_for_setup_ids(&self, setup_ids: &[SetupId]) -> Result<Vec<CommittedGrid>> {
        if setup_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT setup_id, row, col, piece FROM game_setups WHERE setup_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in setup_ids {
            separated.push_bind(id.0);
        }
        separated.push_unseparated(") ORDER BY setup_id, row, col");

        let rows = qb
            .build_query_as::<SetupCellRow>()
            .fetch_all(&self.pool)
            .await?;
        let by_id: BTreeMap<SetupId, CommittedGrid> = group_cells(rows)
            .into_iter()
            .map(|grid| (grid.setup_id, grid))
            .collect();

        Ok(setup_ids
            .iter()
            .filter_map(|id| by_id.get(id).cloned())
            .collect())
    }

    /// Every piece ever committed at (row, col), one entry per setup.
    pub async fn positions_at(&self, row: i64, col: i64) -> Result<Vec<String>> {
        let pieces = sqlx::query_scalar(
            "SELECT piece FROM game_setups WHERE row = ? AND col = ? ORDER BY setup_id",
        )
        .bind(row)
        .bind(col)
        .fetch_all(&self.pool)
        .await?;
        Ok(pieces)
    }

    /// Pieces at (row, col) in games against one opponent, one entry per game.
    pub async fn positions_at_for_opponent(
        &self,
        row: i64,
        col: i64,
        opponent: &str,
    ) -> Result<Vec<String>> {
        let pieces = sqlx::query_scalar(
            "SELECT s.piece
             FROM game_setups s
             INNER JOIN game_records r ON s.setup_id = r.setup_id
             WHERE r.opponent_name = ?
               AND s.row = ?
               AND s.col = ?
             ORDER BY r.record_id",
        )
        .bind(opponent)
        .bind(row)
        .bind(col)
        .fetch_all(&self.pool)
        .await?;
        Ok(pieces)
    }
}

// ==================== STAGING QUERIES ====================
// Only reachable through a locked `StagingSlot`.
impl Database {
    pub(crate) async fn replace_staged_cells(&self, grid: &Grid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM staged_setup")
            .execute(&mut *tx)
            .await?;

        for cell in grid.cells() {
            sqlx::query("INSERT INTO staged_setup (staging_id, row, col, piece) VALUES (?, ?, ?, ?)")
                .bind(STAGING_SETUP_ID)
                .bind(cell.row)
                .bind(cell.col)
                .bind(&cell.piece)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn staged_cells(&self) -> Result<Vec<GridCell>> {
        let cells = sqlx::query_as::<_, GridCell>(
            "SELECT row, col, piece FROM staged_setup WHERE staging_id = ? ORDER BY row, col",
        )
        .bind(STAGING_SETUP_ID)
        .fetch_all(&self.pool)
        .await?;
        Ok(cells)
    }

    pub(crate) async fn clear_staged_cells(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM staged_setup")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ==================== GAME RECORD QUERIES ====================
impl Database {
    /// Setup ids of matching game records, newest setup first.
    pub async fn filter_setup_ids(&self, filters: &SetupFilters) -> Result<Vec<SetupId>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT setup_id FROM game_records WHERE 1=1");

        if let Some(opponent) = &filters.opponent {
            qb.push(" AND opponent_name = ").push_bind(opponent.clone());
        }
        if let Some(result) = filters.result {
            qb.push(" AND result = ").push_bind(result.as_str());
        }
        if let Some(noob_killer) = filters.noob_killer {
            qb.push(" AND noob_killer = ").push_bind(noob_killer);
        }
        if let Some(min_moves) = filters.min_moves {
            qb.push(" AND moves >= ").push_bind(min_moves);
        }
        if let Some(max_moves) = filters.max_moves {
            qb.push(" AND moves <= ").push_bind(max_moves);
        }
        if let Some(start_date) = filters.start_date {
            qb.push(" AND date_played >= ").push_bind(start_date);
        }
        if let Some(end_date) = filters.end_date {
            qb.push(" AND date_played <= ").push_bind(end_date);
        }

        qb.push(" ORDER BY setup_id DESC, record_id DESC");

        let ids: Vec<i64> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(SetupId).collect())
    }

    pub async fn game_records_for_setup(&self, setup_id: SetupId) -> Result<Vec<GameRecord>> {
        let records = sqlx::query_as::<_, GameRecord>(
            "SELECT record_id, setup_id, date_played, opponent_id, opponent_name, result, moves, noob_killer
             FROM game_records WHERE setup_id = ? ORDER BY record_id",
        )
        .bind(setup_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

// ==================== OPPONENT QUERIES ====================
impl Database {
    pub async fn find_opponent(&self, name: &str) -> Result<Opponent> {
        sqlx::query_as::<_, Opponent>(
            "SELECT opponent_id, opponent_name FROM opponents WHERE opponent_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Opponent {} not found", name)))
    }
}

#[cfg(test)]
impl Database {
    /// Fresh in-memory database with the schema applied. A single
    /// connection keeps every query on the same in-memory file.
    pub(crate) async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let db = Self { pool };
        db.run_migrations().await.expect("migrations apply");
        db
    }

    pub(crate) async fn seed_grid(&self, setup_id: SetupId, raw: &RawGrid) {
        let grid = Grid::from_raw(raw).expect("fixture grid is 4x10");
        let mut conn = self.pool.acquire().await.expect("connection");
        Self::commit_grid(&mut conn, setup_id, &grid)
            .await
            .expect("grid commits");
    }

    pub(crate) async fn seed_opponent(&self, opponent_id: i64, name: &str) -> Opponent {
        sqlx::query("INSERT INTO opponents (opponent_id, opponent_name) VALUES (?, ?)")
            .bind(opponent_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .expect("opponent inserts");
        Opponent {
            opponent_id,
            opponent_name: name.to_string(),
        }
    }

    pub(crate) async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .expect("count query")
    }
}
