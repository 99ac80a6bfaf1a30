use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Event object invalid: keys missing - {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    #[error("Event object invalid: {0}")]
    InvalidEvent(String),
}

#[derive(Serialize)]
pub struct BoardReply {
    pub result: String,
}

impl IntoResponse for BoardError {
    fn into_response(self) -> Response {
        let body = BoardReply {
            result: self.to_string(),
        };
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}
