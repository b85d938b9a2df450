use std::collections::BTreeMap;

use crate::{
    constants::{GRID_COLS, GRID_ROWS},
    db::Database,
    error::{AppError, Result},
    models::{Piece, PieceFrequency, PositionHistogram},
};

/// Position Analysis Service - how often each piece was placed on a cell
pub struct PositionAnalysisService {
    db: Database,
}

impl PositionAnalysisService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn histogram(
        &self,
        row: i64,
        col: i64,
        opponent: Option<&str>,
    ) -> Result<PositionHistogram> {
        validate_position(row, col)?;

        let pieces = match opponent {
            Some(name) => self.db.positions_at_for_opponent(row, col, name).await?,
            None => self.db.positions_at(row, col).await?,
        };

        Ok(build_histogram(row, col, opponent, &pieces))
    }
}

fn validate_position(row: i64, col: i64) -> Result<()> {
    if !(1..=GRID_ROWS as i64).contains(&row) || !(1..=GRID_COLS as i64).contains(&col) {
        return Err(AppError::BadRequest(format!(
            "Position out of bounds: ({}, {})",
            row, col
        )));
    }
    Ok(())
}

// Sorted by count desc, ties in canonical piece order.
fn build_histogram(
    row: i64,
    col: i64,
    opponent: Option<&str>,
    pieces: &[String],
) -> PositionHistogram {
    let total = pieces.len();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for piece in pieces {
        *counts.entry(piece.as_str()).or_default() += 1;
    }

    let mut frequencies: Vec<PieceFrequency> = counts
        .into_iter()
        .map(|(piece, count)| PieceFrequency {
            piece: piece.to_string(),
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    frequencies.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| Piece::from_label(&a.piece).cmp(&Piece::from_label(&b.piece)))
    });

    PositionHistogram {
        row,
        col,
        opponent: opponent.map(str::to_string),
        total,
        pieces: frequencies,
    }
}
