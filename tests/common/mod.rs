#![allow(dead_code)]

use hyper::http::{Request, Response};
use k8s_openapi::serde_json::{Value, json};
use kube::client::Body;
use kube_e2e::config::Settings;
use kube_e2e::k8s::Context;
use kube_e2e::k8s::tracker::Tracker;
use kube_e2e::status::StatusReporter;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Nothing listens here, so status reports fail fast and are swallowed.
pub const DEAD_SINK: &str = "http://127.0.0.1:1/update";

/// One scripted answer from the fake API server.
pub struct Reply {
    method: &'static str,
    path: String,
    watch: bool,
    status: u16,
    body: String,
}

impl Reply {
    pub fn new(method: &'static str, path: &str, status: u16, body: &Value) -> Self {
        Self {
            method,
            path: path.to_string(),
            watch: false,
            status,
            body: body.to_string(),
        }
    }

    /// A plain-text answer, as the pod log endpoint gives.
    pub fn text(path: &str, body: &str) -> Self {
        Self {
            method: "GET",
            path: path.to_string(),
            watch: false,
            status: 200,
            body: body.to_string(),
        }
    }

    /// A watch answer: each event on its own line.
    pub fn watch(path: &str, events: &[Value]) -> Self {
        let body = events
            .iter()
            .map(|e| format!("{e}\n"))
            .collect::<String>();
        Self {
            method: "GET",
            path: path.to_string(),
            watch: true,
            status: 200,
            body,
        }
    }
}

/// A kube client backed by a scripted server. The handle finishes once every
/// reply was consumed in order; it panics on an unexpected request.
pub fn mock_client(replies: Vec<Reply>) -> (kube::Client, JoinHandle<()>) {
    let (service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    let server = tokio::spawn(async move {
        for reply in replies {
            let (request, send) = handle.next_request().await.expect("api not called");
            assert_eq!(request.method().as_str(), reply.method, "{}", request.uri());
            assert_eq!(request.uri().path(), reply.path);
            let is_watch = request
                .uri()
                .query()
                .is_some_and(|q| q.contains("watch=true"));
            assert_eq!(is_watch, reply.watch, "{}", request.uri());

            let response = Response::builder()
                .status(reply.status)
                .body(Body::from(reply.body.into_bytes()))
                .unwrap();
            send.send_response(response);
        }
    });
    (kube::Client::new(service, "ns"), server)
}

pub fn settings() -> Settings {
    Settings {
        namespace: "ns".to_string(),
        event_timeout: Duration::from_secs(5),
        delete_poll_interval: Duration::from_secs(1),
        status_sink: DEAD_SINK.to_string(),
        ..Settings::default()
    }
}

pub fn context(client: kube::Client) -> Context {
    Context::new(client, settings()).unwrap()
}

/// Serve `page` on a local port, standing in for a pod or service.
pub async fn serve_page(page: &'static str) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = axum::Router::new().route("/", axum::routing::get(move || async move { page }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// A running pod listening on `127.0.0.1:port`.
pub fn pod(name: &str, port: u16, terminating: bool) -> Value {
    let mut pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": "ns", "labels": { "app": "e2etestapp" } },
        "spec": {
            "nodeName": format!("node-{name}"),
            "containers": [{ "name": "testapp", "ports": [{ "containerPort": port }] }]
        },
        "status": { "phase": "Running", "podIP": "127.0.0.1" }
    });
    if terminating {
        pod["metadata"]["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
    }
    pod
}

pub fn tracker(resource: &str) -> Tracker {
    Tracker::new(StatusReporter::new(reqwest::Client::new(), DEAD_SINK, "ns"), "ns", resource)
}

pub fn not_found(kind: &str, name: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("{kind} \"{name}\" not found"),
        "reason": "NotFound",
        "code": 404
    })
}

pub fn config_map(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": { "name": name, "namespace": "ns", "resourceVersion": "1" },
        "data": { "index.html": "<html></html>" }
    })
}

pub fn event(kind: &str, object: &Value) -> Value {
    json!({ "type": kind, "object": object })
}

pub fn list(api_version: &str, kind: &str, items: &[Value]) -> Value {
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
}

pub fn messages(tracker: &Tracker) -> Vec<String> {
    tracker
        .ledger()
        .entries()
        .iter()
        .map(|e| e.message.clone())
        .collect()
}
