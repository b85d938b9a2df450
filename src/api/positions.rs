use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::Result,
    models::{ApiResponse, PositionHistogram},
    services::PositionAnalysisService,
};

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PositionQuery {
    pub opponent: Option<String>,
}

/// GET /api/v1/positions/{row}/{col}
pub async fn get_position_histogram(
    State(state): State<AppState>,
    Path((row, col)): Path<(i64, i64)>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<ApiResponse<PositionHistogram>>> {
    let service = PositionAnalysisService::new(state.db.clone());
    let opponent = query
        .opponent
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let histogram = service.histogram(row, col, opponent).await?;
    Ok(Json(ApiResponse::success(histogram)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::setups::{submit_setup, SubmitSetupRequest};
    use crate::api::test_support::test_state;
    use crate::error::AppError;
    use crate::models::setup::fixtures::*;
    use crate::models::GameResult;
    use chrono::NaiveDate;

    async fn submit(state: &AppState, grid: crate::models::RawGrid, opponent: &str) {
        submit_setup(
            State(state.clone()),
            Json(SubmitSetupRequest {
                grid,
                date_played: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                opponent: opponent.to_string(),
                result: GameResult::Loss,
                moves: 90,
                noob_killer: false,
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn histogram_can_be_narrowed_to_one_opponent() {
        let state = test_state().await;
        state.db.seed_opponent(1, "alice").await;
        state.db.seed_opponent(2, "bob").await;
        submit(&state, canonical_raw_grid(), "alice").await;
        submit(&state, alternate_raw_grid(), "bob").await;

        let Json(all) = get_position_histogram(
            State(state.clone()),
            Path((4, 10)),
            Query(PositionQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(all.data.total, 2);

        let Json(bob) = get_position_histogram(
            State(state),
            Path((4, 10)),
            Query(PositionQuery {
                opponent: Some("bob".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(bob.data.total, 1);
        assert_eq!(bob.data.opponent.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn off_board_position_is_rejected() {
        let state = test_state().await;
        let err = get_position_histogram(
            State(state),
            Path((5, 1)),
            Query(PositionQuery::default()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
