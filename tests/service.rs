mod common;

use common::{Reply, context, event, mock_client, serve_page};
use k8s_openapi::serde_json::{Value, json};
use kube_e2e::k8s::service::ServiceController;

const ENDPOINTS: &str = "/api/v1/namespaces/ns/endpoints";
const OWN_ENDPOINTS: &str = "/api/v1/namespaces/ns/endpoints/kube-e2e";
const OWN_SERVICE: &str = "/api/v1/namespaces/ns/services/kube-e2e";

fn endpoints(name: &str, addresses: &[&str]) -> Value {
    let mut endpoints = json!({
        "apiVersion": "v1",
        "kind": "Endpoints",
        "metadata": { "name": name, "namespace": "ns" }
    });
    if !addresses.is_empty() {
        let addresses: Vec<Value> = addresses.iter().map(|ip| json!({ "ip": ip })).collect();
        endpoints["subsets"] = json!([{ "addresses": addresses, "ports": [{ "port": 80 }] }]);
    }
    endpoints
}

fn service(port: u16) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": "kube-e2e", "namespace": "ns" },
        "spec": { "clusterIP": "127.0.0.1", "ports": [{ "port": port }] }
    })
}

fn messages(s: &mut ServiceController) -> Vec<String> {
    s.take_errors().into_iter().map(|e| e.message).collect()
}

#[tokio::test]
async fn endpoints_drain_to_nothing() {
    let (client, server) = mock_client(vec![Reply::watch(
        ENDPOINTS,
        &[
            event("MODIFIED", &endpoints("kube-e2e", &["10.0.0.1", "10.0.0.2"])),
            event("MODIFIED", &endpoints("other", &[])),
            event("MODIFIED", &endpoints("kube-e2e", &[])),
        ],
    )]);
    let mut s = ServiceController::new(&context(client), 0);

    s.watch_endpoints(false).await;

    assert!(messages(&mut s).is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn endpoints_never_seen_is_a_failure() {
    let (client, server) = mock_client(vec![Reply::watch(
        ENDPOINTS,
        &[event("ADDED", &endpoints("other", &[]))],
    )]);
    let mut s = ServiceController::new(&context(client), 0);

    s.watch_endpoints(false).await;

    assert_eq!(
        messages(&mut s),
        vec!["Endpoints event stream closed after 0 of 1 events, could not track events"]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn endpoints_still_populated_when_stream_closes() {
    let (client, server) = mock_client(vec![Reply::watch(
        ENDPOINTS,
        &[event("MODIFIED", &endpoints("kube-e2e", &["10.0.0.1", "10.0.0.2"]))],
    )]);
    let mut s = ServiceController::new(&context(client), 0);

    s.watch_endpoints(false).await;

    assert_eq!(
        messages(&mut s),
        vec![
            "Endpoints event stream closed after 0 of 1 events, could not track events",
            "Subsets doesn't match expected - found 1, not 0",
        ]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn endpoints_watch_error_recorded() {
    let forbidden = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": "endpoints \"kube-e2e\" is forbidden",
        "reason": "Forbidden",
        "code": 403
    });
    let (client, server) = mock_client(vec![Reply::watch(
        ENDPOINTS,
        &[
            event("MODIFIED", &endpoints("kube-e2e", &["10.0.0.1", "10.0.0.2", "10.0.0.3"])),
            event("ERROR", &forbidden),
        ],
    )]);
    let mut s = ServiceController::new(&context(client), 0);

    s.watch_endpoints(false).await;

    assert_eq!(
        messages(&mut s),
        vec![
            "endpoints \"kube-e2e\" is forbidden",
            "Subsets doesn't match expected - found 1, not 0",
        ]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn endpoints_filling_up_to_replicas() {
    let (client, server) = mock_client(vec![Reply::watch(
        ENDPOINTS,
        &[
            event("ADDED", &endpoints("kube-e2e", &[])),
            event("MODIFIED", &endpoints("kube-e2e", &["10.0.0.1"])),
            event("MODIFIED", &endpoints("kube-e2e", &["10.0.0.1", "10.0.0.2", "10.0.0.3"])),
        ],
    )]);
    let mut s = ServiceController::new(&context(client), 3);

    s.watch_endpoints(false).await;

    assert!(messages(&mut s).is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn read_endpoints_address_shortfall() {
    let (client, server) = mock_client(vec![Reply::new(
        "GET",
        OWN_ENDPOINTS,
        200,
        &endpoints("kube-e2e", &["10.0.0.1", "10.0.0.2"]),
    )]);
    let mut s = ServiceController::new(&context(client), 3);

    s.read_endpoints(false).await;

    assert_eq!(
        messages(&mut s),
        vec!["Addresses doesn't match expected - found 2, not 3"]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn request_by_ip_serves_expected_page() {
    let port = serve_page("<html>hello</html>").await;
    let (client, server) = mock_client(vec![Reply::new("GET", OWN_SERVICE, 200, &service(port))]);
    let mut s = ServiceController::new(&context(client), 3);

    s.request_n_times(3, "<html>hello</html>", false, false).await;

    assert!(messages(&mut s).is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn request_by_ip_wrong_page_per_attempt() {
    let port = serve_page("<html>old</html>").await;
    let (client, server) = mock_client(vec![Reply::new("GET", OWN_SERVICE, 200, &service(port))]);
    let mut s = ServiceController::new(&context(client), 3);

    s.request_n_times(2, "<html>new</html>", false, false).await;

    assert_eq!(
        messages(&mut s),
        vec![
            "Response text did not match expected - request 0",
            "Response text did not match expected - request 1",
        ]
    );
    server.await.unwrap();
}
