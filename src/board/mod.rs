//! Status board: collects status events from runners and shows the latest
//! result of every check.
//!
//! - `POST /update` - accept one status event
//! - `GET /` - latest event per (namespace, name), newest first, plus staleness errors

mod error;
mod store;

pub use error::{BoardError, BoardReply};
pub use store::{Board, BoardView};

use crate::status::StatusEvent;
use axum::{Json, Router, extract::State, routing::{get, post}};
use k8s_openapi::serde_json::{self, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const REQUIRED_KEYS: [&str; 5] = ["name", "passing", "info", "namespace", "time"];

pub fn router(board: Arc<Board>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/update", post(update_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(board)
}

async fn status_handler(State(board): State<Arc<Board>>) -> Json<BoardView> {
    Json(board.view())
}

async fn update_handler(
    State(board): State<Arc<Board>>,
    Json(data): Json<Value>,
) -> Result<Json<BoardReply>, BoardError> {
    let missing: Vec<&'static str> = REQUIRED_KEYS
        .into_iter()
        .filter(|key| data.get(key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(BoardError::MissingKeys(missing));
    }

    let event: StatusEvent =
        serde_json::from_value(data).map_err(|e| BoardError::InvalidEvent(e.to_string()))?;
    debug!("{} {} passing={}", event.namespace(), event.name(), event.passing());
    board.put(event);

    Ok(Json(BoardReply {
        result: "event put onto queue".to_string(),
    }))
}

/// Serve the board on `addr` until Ctrl-C.
///
/// # Errors
///
/// Will return `Err` if the listener cannot bind or the server fails
pub async fn serve(addr: SocketAddr, board: Arc<Board>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Status board listening on {}", listener.local_addr()?);
    axum::serve(listener, router(board))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
