use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{GRID_CELLS, GRID_COLS, GRID_ROWS};
use crate::error::ShapeError;

/// Identity of a committed grid. Assigned at commit time, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SetupId(pub i64);

impl SetupId {
    pub const FIRST: SetupId = SetupId(1);

    pub fn next(self) -> SetupId {
        SetupId(self.0 + 1)
    }
}

impl fmt::Display for SetupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Piece {
    Spy,
    Scout,
    Miner,
    Sergeant,
    Lieutenant,
    Captain,
    Major,
    Colonel,
    General,
    Marshal,
    Bomb,
    Flag,
}

impl Piece {
    /// Canonical ordering: ranks 1..10, then bomb and flag.
    pub const ALL: [Piece; 12] = [
        Piece::Spy,
        Piece::Scout,
        Piece::Miner,
        Piece::Sergeant,
        Piece::Lieutenant,
        Piece::Captain,
        Piece::Major,
        Piece::Colonel,
        Piece::General,
        Piece::Marshal,
        Piece::Bomb,
        Piece::Flag,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Piece::Spy => "1",
            Piece::Scout => "2",
            Piece::Miner => "3",
            Piece::Sergeant => "4",
            Piece::Lieutenant => "5",
            Piece::Captain => "6",
            Piece::Major => "7",
            Piece::Colonel => "8",
            Piece::General => "9",
            Piece::Marshal => "10",
            Piece::Bomb => "B",
            Piece::Flag => "F",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Piece::ALL.into_iter().find(|piece| piece.label() == label)
    }

    /// How many of this piece a legal army contains.
    pub fn required_count(&self) -> usize {
        match self {
            Piece::Spy => 1,
            Piece::Scout => 8,
            Piece::Miner => 5,
            Piece::Sergeant => 4,
            Piece::Lieutenant => 4,
            Piece::Captain => 4,
            Piece::Major => 3,
            Piece::Colonel => 2,
            Piece::General => 1,
            Piece::Marshal => 1,
            Piece::Bomb => 6,
            Piece::Flag => 1,
        }
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Untrusted grid as produced by transcription or typed in by a user:
/// row key ("1".."4") to the row's piece labels, left to right.
pub type RawGrid = BTreeMap<String, Vec<String>>;

/// One (row, col, piece) cell. Rows and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GridCell {
    pub row: i64,
    pub col: i64,
    pub piece: String,
}

/// A shape-checked 4 x 10 grid of piece labels.
///
/// Labels are not checked against the piece set here; that happens on the
/// staged copy during the consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: [[String; GRID_COLS]; GRID_ROWS],
}

impl Grid {
    pub fn from_raw(raw: &RawGrid) -> Result<Self, ShapeError> {
        if raw.len() != GRID_ROWS {
            return Err(ShapeError::RowCount { found: raw.len() });
        }

        let mut rows: [[String; GRID_COLS]; GRID_ROWS] = Default::default();
        let mut filled = [false; GRID_ROWS];

        for (key, pieces) in raw {
            let index = parse_row_key(key).ok_or_else(|| ShapeError::UnknownRow {
                row: key.clone(),
            })?;
            if filled[index] {
                return Err(ShapeError::UnknownRow { row: key.clone() });
            }
            if pieces.len() != GRID_COLS {
                return Err(ShapeError::RowLength {
                    row: key.clone(),
                    found: pieces.len(),
                });
            }
            for (col, piece) in pieces.iter().enumerate() {
                rows[index][col] = piece.clone();
            }
            filled[index] = true;
        }

        Ok(Self { rows })
    }

    /// Piece label at a 1-based position.
    pub fn piece_at(&self, row: i64, col: i64) -> Option<&str> {
        let r = usize::try_from(row).ok()?.checked_sub(1)?;
        let c = usize::try_from(col).ok()?.checked_sub(1)?;
        self.rows.get(r)?.get(c).map(String::as_str)
    }

    pub fn cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, piece)| GridCell {
                row: r as i64 + 1,
                col: c as i64 + 1,
                piece: piece.clone(),
            })
        })
    }

    pub fn to_raw(&self) -> RawGrid {
        self.rows
            .iter()
            .enumerate()
            .map(|(r, row)| ((r + 1).to_string(), row.to_vec()))
            .collect()
    }

    /// Number of positions holding the same piece in both grids.
    pub fn matching_cells(&self, cells: &[GridCell]) -> usize {
        cells
            .iter()
            .filter(|cell| self.piece_at(cell.row, cell.col) == Some(cell.piece.as_str()))
            .count()
    }
}

fn parse_row_key(key: &str) -> Option<usize> {
    let row: usize = key.trim().parse().ok()?;
    (1..=GRID_ROWS).contains(&row).then(|| row - 1)
}

/// All cells of one committed grid.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedGrid {
    pub setup_id: SetupId,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimilarityScore {
    pub setup_id: SetupId,
    pub matching_cells: usize,
    pub total_cells: usize,
}

impl SimilarityScore {
    pub fn new(setup_id: SetupId, matching_cells: usize) -> Self {
        Self {
            setup_id,
            matching_cells,
            total_cells: GRID_CELLS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PieceFrequency {
    pub piece: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionHistogram {
    pub row: i64,
    pub col: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<String>,
    pub total: usize,
    pub pieces: Vec<PieceFrequency>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::RawGrid;

    /// A legal army, row by row.
    pub fn canonical_raw_grid() -> RawGrid {
        raw_grid([
            ["6", "2", "6", "4", "8", "2", "5", "2", "2", "5"],
            ["3", "5", "2", "9", "7", "5", "2", "B", "4", "8"],
            ["B", "2", "7", "1", "6", "2", "7", "10", "6", "3"],
            ["B", "4", "B", "3", "B", "3", "B", "4", "3", "F"],
        ])
    }

    /// A second legal army, distinct from the canonical fixture.
    pub fn alternate_raw_grid() -> RawGrid {
        raw_grid([
            ["4", "B", "4", "10", "4", "6", "2", "8", "5", "3"],
            ["6", "2", "7", "2", "7", "2", "2", "1", "9", "6"],
            ["8", "2", "5", "B", "3", "B", "4", "7", "2", "2"],
            ["3", "3", "B", "F", "B", "B", "5", "5", "3", "6"],
        ])
    }

    pub fn raw_grid(rows: [[&str; 10]; 4]) -> RawGrid {
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                (
                    (i + 1).to_string(),
                    row.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }
}
