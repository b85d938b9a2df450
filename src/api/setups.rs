use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::{
        ApiResponse, CommittedGrid, GameDetails, GameRecord, GameResult, Grid, RawGrid, SetupFilters,
        SetupId, SimilarityScore,
    },
    services::ProcessedSetup,
};

use super::AppState;

const DEFAULT_IMAGE_MIME: &str = "image/png";

#[derive(Debug, Deserialize)]
pub struct SubmitSetupRequest {
    pub grid: RawGrid,
    pub date_played: NaiveDate,
    pub opponent: String,
    pub result: GameResult,
    #[serde(default)]
    pub moves: u32,
    #[serde(default)]
    pub noob_killer: bool,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub image_base64: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub grid: RawGrid,
    /// False when the grid is not 4x10 and needs correcting before submission.
    pub well_formed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CellsQuery {
    pub ids: String,
}

/// POST /api/v1/setups
pub async fn submit_setup(
    State(state): State<AppState>,
    Json(req): Json<SubmitSetupRequest>,
) -> Result<Json<ApiResponse<ProcessedSetup>>> {
    let opponent = state.db.find_opponent(req.opponent.trim()).await?;
    let details = GameDetails::against(&opponent, req.date_played, req.result)
        .with_moves(req.moves)
        .with_noob_killer(req.noob_killer);

    // Detached so a dropped connection cannot interrupt the staging cleanup.
    let processor = state.processor.clone();
    let grid = req.grid;
    let processed = tokio::spawn(async move { processor.process(&grid, &details).await })
        .await
        .map_err(|e| AppError::Internal(format!("Setup processing task failed: {}", e)))??;

    Ok(Json(ApiResponse::success(processed)))
}

/// POST /api/v1/setups/transcribe
pub async fn transcribe_setup(
    State(state): State<AppState>,
    Json(req): Json<TranscribeRequest>,
) -> Result<Json<ApiResponse<TranscribeResponse>>> {
    let (embedded_mime, encoded) = split_data_url(&req.image_base64);
    let image = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 image: {}", e)))?;
    if image.is_empty() {
        return Err(AppError::BadRequest("Image is empty".to_string()));
    }

    let mime_type = req
        .mime_type
        .as_deref()
        .or(embedded_mime)
        .unwrap_or(DEFAULT_IMAGE_MIME);
    if !mime_type.starts_with("image/") {
        return Err(AppError::BadRequest(format!(
            "Unsupported mime type: {}",
            mime_type
        )));
    }

    let raw = state.transcriber.transcribe(&image, mime_type).await?;
    let response = match Grid::from_raw(&raw) {
        Ok(grid) => TranscribeResponse {
            grid: grid.to_raw(),
            well_formed: true,
        },
        Err(e) => {
            tracing::warn!("Transcribed grid is malformed: {}", e);
            TranscribeResponse {
                grid: raw,
                well_formed: false,
            }
        }
    };
    Ok(Json(ApiResponse::success(response)))
}

/// POST /api/v1/setups/similarity
pub async fn similarity(
    State(state): State<AppState>,
    Json(raw): Json<RawGrid>,
) -> Result<Json<ApiResponse<Vec<SimilarityScore>>>> {
    let grid = Grid::from_raw(&raw)?;
    let scores = state.processor.detector().similarity_scores(&grid).await?;
    Ok(Json(ApiResponse::success(scores)))
}

/// GET /api/v1/setups
pub async fn list_setup_ids(
    State(state): State<AppState>,
    Query(filters): Query<SetupFilters>,
) -> Result<Json<ApiResponse<Vec<SetupId>>>> {
    if filters.is_empty() {
        tracing::debug!("No filters given; listing every recorded game");
    }
    let ids = state.db.filter_setup_ids(&filters).await?;
    Ok(Json(ApiResponse::success(ids)))
}

/// GET /api/v1/setups/cells?ids=3,1,2
pub async fn get_setup_cells(
    State(state): State<AppState>,
    Query(query): Query<CellsQuery>,
) -> Result<Json<ApiResponse<Vec<CommittedGrid>>>> {
    let ids = parse_setup_ids(&query.ids)?;
    let grids = state.db.cells_for_setup_ids(&ids).await?;
    Ok(Json(ApiResponse::success(grids)))
}

/// GET /api/v1/setups/{setup_id}/games
pub async fn get_setup_games(
    State(state): State<AppState>,
    Path(setup_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<GameRecord>>>> {
    let records = state.db.game_records_for_setup(SetupId(setup_id)).await?;
    Ok(Json(ApiResponse::success(records)))
}

fn parse_setup_ids(raw: &str) -> Result<Vec<SetupId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map(SetupId)
                .map_err(|_| AppError::BadRequest(format!("Invalid setup id: {}", s)))
        })
        .collect()
}

// "data:image/jpeg;base64,AAAA" -> (Some("image/jpeg"), "AAAA")
fn split_data_url(input: &str) -> (Option<&str>, &str) {
    let Some(rest) = input.strip_prefix("data:") else {
        return (None, input);
    };
    match rest.split_once(";base64,") {
        Some((mime, data)) if !mime.is_empty() => (Some(mime), data),
        Some((_, data)) => (None, data),
        None => (None, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{test_state, test_state_with_transcriber};
    use crate::error::ConsistencyError;
    use crate::models::setup::fixtures::*;

    fn submission(grid: RawGrid, opponent: &str) -> SubmitSetupRequest {
        SubmitSetupRequest {
            grid,
            date_played: NaiveDate::from_ymd_opt(2025, 4, 24).unwrap(),
            opponent: opponent.to_string(),
            result: GameResult::Win,
            moves: 312,
            noob_killer: false,
        }
    }

    #[test]
    fn parses_id_lists() {
        assert_eq!(
            parse_setup_ids("3, 1,2").unwrap(),
            vec![SetupId(3), SetupId(1), SetupId(2)]
        );
        assert!(parse_setup_ids("").unwrap().is_empty());
        assert!(matches!(
            parse_setup_ids("1,x"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn splits_data_urls() {
        assert_eq!(split_data_url("data:image/jpeg;base64,QUJD"), (Some("image/jpeg"), "QUJD"));
        assert_eq!(split_data_url("QUJD"), (None, "QUJD"));
    }

    #[tokio::test]
    async fn submit_then_resubmit_reuses_setup() {
        let state = test_state().await;
        state.db.seed_opponent(7, "Sekertzis1973").await;

        let Json(first) = submit_setup(
            State(state.clone()),
            Json(submission(canonical_raw_grid(), "Sekertzis1973")),
        )
        .await
        .unwrap();
        assert_eq!(first.data.setup_id, SetupId(1));
        assert!(!first.data.reused_existing);

        let Json(second) = submit_setup(
            State(state.clone()),
            Json(submission(canonical_raw_grid(), "Sekertzis1973")),
        )
        .await
        .unwrap();
        assert_eq!(second.data.setup_id, SetupId(1));
        assert!(second.data.reused_existing);

        let Json(games) = get_setup_games(State(state), Path(1)).await.unwrap();
        assert_eq!(games.data.len(), 2);
        assert_eq!(games.data[0].opponent_id, Some(7));
    }

    #[tokio::test]
    async fn submit_with_unknown_opponent_is_not_found() {
        let state = test_state().await;
        let err = submit_setup(State(state.clone()), Json(submission(canonical_raw_grid(), "nobody")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.db.count_rows("game_setups").await, 0);
    }

    #[tokio::test]
    async fn submit_surfaces_consistency_errors() {
        let state = test_state().await;
        state.db.seed_opponent(1, "alice").await;
        let mut raw = canonical_raw_grid();
        raw.get_mut("1").unwrap()[0] = "Q".to_string();

        let err = submit_setup(State(state), Json(submission(raw, "alice")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Consistency(ConsistencyError::InvalidPiece(_))
        ));
    }

    #[tokio::test]
    async fn cells_and_filters_follow_committed_data() {
        let state = test_state().await;
        state.db.seed_opponent(1, "alice").await;
        state.db.seed_opponent(2, "bob").await;
        submit_setup(State(state.clone()), Json(submission(canonical_raw_grid(), "alice")))
            .await
            .unwrap();
        submit_setup(State(state.clone()), Json(submission(alternate_raw_grid(), "bob")))
            .await
            .unwrap();

        let Json(ids) = list_setup_ids(
            State(state.clone()),
            Query(SetupFilters {
                opponent: Some("bob".to_string()),
                ..SetupFilters::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(ids.data, vec![SetupId(2)]);

        let Json(cells) = get_setup_cells(
            State(state),
            Query(CellsQuery {
                ids: "2,99,1".to_string(),
            }),
        )
        .await
        .unwrap();
        let order: Vec<SetupId> = cells.data.iter().map(|g| g.setup_id).collect();
        assert_eq!(order, vec![SetupId(2), SetupId(1)]);
        assert!(cells.data.iter().all(|g| g.cells.len() == 40));
    }

    #[tokio::test]
    async fn similarity_scores_committed_grids() {
        let state = test_state().await;
        state.db.seed_grid(SetupId(1), &canonical_raw_grid()).await;
        state.db.seed_grid(SetupId(2), &alternate_raw_grid()).await;

        let Json(scores) = similarity(State(state), Json(canonical_raw_grid()))
            .await
            .unwrap();
        assert_eq!(scores.data[0], SimilarityScore::new(SetupId(1), 40));
        assert_eq!(scores.data[1], SimilarityScore::new(SetupId(2), 6));
    }

    #[tokio::test]
    async fn similarity_rejects_malformed_grid() {
        let state = test_state().await;
        let mut raw = canonical_raw_grid();
        raw.remove("4");
        let err = similarity(State(state), Json(raw)).await.unwrap_err();
        assert!(matches!(err, AppError::Shape(_)));
    }

    #[tokio::test]
    async fn transcribe_returns_grid_for_review() {
        let state = test_state_with_transcriber(canonical_raw_grid()).await;
        let Json(response) = transcribe_setup(
            State(state),
            Json(TranscribeRequest {
                image_base64: format!("data:image/jpeg;base64,{}", STANDARD.encode(b"jpeg")),
                mime_type: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.data.grid, canonical_raw_grid());
        assert!(response.data.well_formed);
    }

    #[tokio::test]
    async fn transcribe_flags_malformed_grid() {
        let mut raw = canonical_raw_grid();
        raw.get_mut("2").unwrap().pop();
        let state = test_state_with_transcriber(raw.clone()).await;
        let Json(response) = transcribe_setup(
            State(state),
            Json(TranscribeRequest {
                image_base64: STANDARD.encode(b"png"),
                mime_type: Some("image/png".to_string()),
            }),
        )
        .await
        .unwrap();
        assert!(!response.data.well_formed);
        assert_eq!(response.data.grid, raw);
    }

    #[tokio::test]
    async fn transcribe_rejects_bad_input() {
        let state = test_state_with_transcriber(canonical_raw_grid()).await;
        let err = transcribe_setup(
            State(state.clone()),
            Json(TranscribeRequest {
                image_base64: "***".to_string(),
                mime_type: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = transcribe_setup(
            State(state),
            Json(TranscribeRequest {
                image_base64: STANDARD.encode(b"pdf"),
                mime_type: Some("application/pdf".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn transcribe_without_api_key_is_a_gateway_error() {
        let state = test_state().await;
        let err = transcribe_setup(
            State(state),
            Json(TranscribeRequest {
                image_base64: STANDARD.encode(b"png"),
                mime_type: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Transcription(_)));
    }
}
