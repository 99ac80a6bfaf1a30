use kube_e2e::board::{self, Board};
use kube_e2e::ledger::ErrorLedger;
use kube_e2e::status::StatusReporter;
use std::sync::Arc;

async fn start_board() -> (Arc<Board>, String) {
    let board = Arc::new(Board::new(20.0));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = board::router(Arc::clone(&board));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (board, format!("http://{addr}"))
}

#[tokio::test]
async fn reporter_delivers_to_board() {
    let (board, base) = start_board().await;
    let reporter = StatusReporter::new(reqwest::Client::new(), format!("{base}/update"), "kube-e2e");

    let mut ledger = ErrorLedger::new();
    ledger.record("Pod web-0 not found");
    ledger.record("Pod web-0 not found");
    let status = reporter.report(&mut ledger, "Check Pod exists").await;
    assert_eq!(status, Some(reqwest::StatusCode::OK));

    let status = reporter.report(&mut ledger, "Read pods").await;
    assert_eq!(status, Some(reqwest::StatusCode::OK));
    assert_eq!(board.len(), 2);

    let view = board.view();
    let failing = view
        .results
        .iter()
        .find(|e| e.name() == "Check Pod exists")
        .unwrap();
    assert!(!failing.passing());
    assert_eq!(failing.info()[0].occurrences, 2);
    assert!(
        view.results
            .iter()
            .find(|e| e.name() == "Read pods")
            .unwrap()
            .passing()
    );
}

#[tokio::test]
async fn board_rejects_incomplete_event_over_http() {
    let (board, base) = start_board().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/update"))
        .json(&k8s_openapi::serde_json::json!({ "name": "x" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: k8s_openapi::serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["result"],
        "Event object invalid: keys missing - passing, info, namespace, time"
    );
    assert!(board.is_empty());
}
