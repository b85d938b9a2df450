use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::Result,
    models::{ApiResponse, Opponent},
};

use super::AppState;

/// GET /api/v1/opponents/{name}
pub async fn get_opponent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Opponent>>> {
    let opponent = state.db.find_opponent(name.trim()).await?;
    Ok(Json(ApiResponse::success(opponent)))
}
