use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::constants::{GRID_CELLS, GRID_COLS, GRID_ROWS};

/// Raised at the ingestion boundary when a transcribed grid is not 4 x 10.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Setup must have exactly {} rows, got {found}", GRID_ROWS)]
    RowCount { found: usize },

    #[error("Unknown row key {row:?}, expected \"1\" to \"{}\"", GRID_ROWS)]
    UnknownRow { row: String },

    #[error("Row {row} must have exactly {} pieces, got {found}", GRID_COLS)]
    RowLength { row: String, found: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuantityMismatch {
    pub piece: String,
    pub found: usize,
    pub expected: usize,
}

/// Violations of the canonical army composition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Amount of pieces is incorrect. It's {found} instead of {}.", GRID_CELLS)]
    CountMismatch { found: usize },

    #[error("Invalid piece type: {0}")]
    InvalidPiece(String),

    #[error("{}", format_quantity_mismatches(.0))]
    Quantity(Vec<QuantityMismatch>),
}

fn format_quantity_mismatches(mismatches: &[QuantityMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| {
            format!(
                "Incorrect count for piece {}. Found {}, expected {}.",
                m.piece, m.found, m.expected
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid setup shape: {0}")]
    Shape(#[from] ShapeError),

    #[error("Inconsistent setup: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Shape(_) => (StatusCode::BAD_REQUEST, "SHAPE_ERROR"),
            AppError::Consistency(ConsistencyError::CountMismatch { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "COUNT_MISMATCH")
            }
            AppError::Consistency(ConsistencyError::InvalidPiece(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PIECE")
            }
            AppError::Consistency(ConsistencyError::Quantity(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "QUANTITY_MISMATCH")
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Transcription(_) => (StatusCode::BAD_GATEWAY, "TRANSCRIPTION_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Structured payload a client can use to correct the source grid.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Shape(ShapeError::RowCount { found }) => Some(serde_json::json!({
                "expected_rows": GRID_ROWS,
                "found_rows": found,
            })),
            AppError::Shape(ShapeError::UnknownRow { row }) => {
                Some(serde_json::json!({ "row": row }))
            }
            AppError::Shape(ShapeError::RowLength { row, found }) => Some(serde_json::json!({
                "row": row,
                "expected": GRID_COLS,
                "found": found,
            })),
            AppError::Consistency(ConsistencyError::CountMismatch { found }) => {
                Some(serde_json::json!({ "expected": GRID_CELLS, "found": found }))
            }
            AppError::Consistency(ConsistencyError::InvalidPiece(piece)) => {
                Some(serde_json::json!({ "piece": piece }))
            }
            AppError::Consistency(ConsistencyError::Quantity(mismatches)) => {
                Some(serde_json::json!({ "mismatches": mismatches }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
