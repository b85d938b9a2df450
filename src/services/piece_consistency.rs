use std::collections::HashMap;

use crate::{
    constants::GRID_CELLS,
    error::{ConsistencyError, QuantityMismatch},
    models::Piece,
};

/// Checks that `labels` form exactly one legal Stratego army.
///
/// The total is checked first, then every label must name a known piece,
/// and finally each piece count is compared against the canonical
/// composition. All count mismatches are reported together.
pub fn check_piece_consistency<'a, I>(labels: I) -> Result<(), ConsistencyError>
where
    I: IntoIterator<Item = &'a str>,
{
    let labels: Vec<&str> = labels.into_iter().collect();
    if labels.len() != GRID_CELLS {
        return Err(ConsistencyError::CountMismatch {
            found: labels.len(),
        });
    }

    let mut counts: HashMap<Piece, usize> = HashMap::new();
    for label in labels {
        let piece = Piece::from_label(label)
            .ok_or_else(|| ConsistencyError::InvalidPiece(label.to_string()))?;
        *counts.entry(piece).or_default() += 1;
    }

    let mismatches: Vec<QuantityMismatch> = Piece::ALL
        .iter()
        .filter_map(|piece| {
            let found = counts.get(piece).copied().unwrap_or(0);
            let expected = piece.required_count();
            (found != expected).then(|| QuantityMismatch {
                piece: piece.label().to_string(),
                found,
                expected,
            })
        })
        .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ConsistencyError::Quantity(mismatches))
    }
}
