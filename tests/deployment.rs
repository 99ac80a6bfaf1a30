mod common;

use common::{Reply, context, event, list, mock_client, pod, serve_page};
use k8s_openapi::serde_json::json;
use kube_e2e::k8s::deployment::DeploymentController;

const PODS: &str = "/api/v1/namespaces/ns/pods";
const DEPLOYMENT: &str = "/apis/apps/v1/namespaces/ns/deployments/e2etestapp";

fn deployment_body() -> k8s_openapi::serde_json::Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": "e2etestapp", "namespace": "ns" }
    })
}

fn messages(d: &mut DeploymentController) -> Vec<String> {
    d.take_errors().into_iter().map(|e| e.message).collect()
}

fn log_line(user_agent: &str) -> String {
    format!("127.0.0.1 - - \"GET / HTTP/1.1\" 200 612 \"-\" \"{user_agent}\"\n")
}

#[tokio::test]
async fn rollout_leaves_old_generation_out() {
    let (client, server) = mock_client(vec![
        Reply::new("GET", PODS, 200, &list("v1", "PodList", &[pod("old-0", 80, false)])),
        Reply::new("PUT", DEPLOYMENT, 200, &deployment_body()),
        Reply::watch(
            PODS,
            &[
                event("MODIFIED", &pod("stale-0", 80, true)),
                event("MODIFIED", &pod("old-0", 80, true)),
                event("ADDED", &pod("new-0", 80, false)),
                event("ADDED", &pod("new-1", 80, false)),
                event("MODIFIED", &pod("old-0", 80, true)),
                event("ADDED", &pod("new-2", 80, false)),
            ],
        ),
    ]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.read_pods(false).await;
    assert_eq!(d.pod_names(), vec!["old-0"]);
    d.change_config_map("hello-kubernetes", false).await;
    d.wait_on_pods_ready(false).await;

    assert_eq!(d.pod_names(), vec!["new-0", "new-1", "new-2"]);
    assert_eq!(d.running_pods(), 3);
    assert!(messages(&mut d).is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn pod_leaving_mid_watch_stops_counting() {
    let (client, server) = mock_client(vec![Reply::watch(
        PODS,
        &[
            event("ADDED", &pod("web-0", 80, false)),
            event("ADDED", &pod("web-1", 80, false)),
            event("MODIFIED", &pod("web-1", 80, true)),
            event("ADDED", &pod("web-2", 80, false)),
        ],
    )]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.wait_on_pods_ready(false).await;

    assert_eq!(d.pod_names(), vec!["web-0", "web-2"]);
    assert_eq!(
        messages(&mut d),
        vec!["Pod event stream closed after 2 of 3 events, could not track events"]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn deletion_watch_counts_distinct_pods() {
    let (client, server) = mock_client(vec![
        Reply::new(
            "GET",
            PODS,
            200,
            &list("v1", "PodList", &[pod("web-0", 80, false), pod("web-1", 80, false)]),
        ),
        Reply::watch(
            PODS,
            &[
                event("MODIFIED", &pod("web-1", 80, true)),
                event("DELETED", &pod("web-0", 80, true)),
                event("DELETED", &pod("web-0", 80, true)),
                event("DELETED", &pod("web-1", 80, true)),
            ],
        ),
    ]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.read_pods(false).await;
    d.watch_pod_scaling(false).await;

    assert!(messages(&mut d).is_empty());
    // kept so the deletions can be checked afterwards
    assert_eq!(d.pod_names(), vec!["web-0", "web-1"]);
    server.await.unwrap();
}

#[tokio::test]
async fn deletion_watch_short_of_known_pods() {
    let (client, server) = mock_client(vec![
        Reply::new(
            "GET",
            PODS,
            200,
            &list("v1", "PodList", &[pod("web-0", 80, false), pod("web-1", 80, false)]),
        ),
        Reply::watch(
            PODS,
            &[
                event("DELETED", &pod("web-0", 80, true)),
                event("DELETED", &pod("web-0", 80, true)),
            ],
        ),
    ]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.read_pods(false).await;
    d.watch_pod_scaling(false).await;

    assert_eq!(
        messages(&mut d),
        vec!["Pod event stream closed after 1 of 2 events, could not track events"]
    );
    server.await.unwrap();
}

#[tokio::test]
async fn wrong_page_recorded_once_per_message() {
    let port = serve_page("<html>old</html>").await;
    let (client, server) = mock_client(vec![Reply::new(
        "GET",
        PODS,
        200,
        &list("v1", "PodList", &[pod("web-0", port, false), pod("web-1", port, false)]),
    )]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.read_pods(false).await;
    d.http_request_all_pods("<html>new</html>", false).await;

    let errors = d.take_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Response text does not match expected text");
    assert_eq!(errors[0].occurrences, 2);
    server.await.unwrap();
}

#[tokio::test]
async fn log_total_covers_service_and_direct_requests() {
    let page = "<html>page</html>";
    let port = serve_page(page).await;
    let ua = kube_e2e::USER_AGENT;
    let three = log_line(ua).repeat(3);
    let (client, server) = mock_client(vec![
        Reply::new(
            "GET",
            PODS,
            200,
            &list("v1", "PodList", &[pod("web-0", port, false), pod("web-1", port, false)]),
        ),
        Reply::text(&format!("{PODS}/web-0/log"), &format!("{three}{}", log_line("curl/8.0"))),
        Reply::text(&format!("{PODS}/web-1/log"), &three),
    ]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.read_pods(false).await;
    d.begin_request_window();
    d.http_request_all_pods(page, false).await;
    // 4 through the service plus one direct request to each of 2 pods
    d.validate_pod_log(4, ua, false).await;

    assert!(messages(&mut d).is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn log_shortfall_recorded() {
    let page = "<html>page</html>";
    let port = serve_page(page).await;
    let ua = kube_e2e::USER_AGENT;
    let (client, server) = mock_client(vec![
        Reply::new(
            "GET",
            PODS,
            200,
            &list("v1", "PodList", &[pod("web-0", port, false), pod("web-1", port, false)]),
        ),
        Reply::text(&format!("{PODS}/web-0/log"), &log_line(ua).repeat(3)),
        Reply::text(&format!("{PODS}/web-1/log"), &log_line("curl/8.0")),
    ]);
    let mut d = DeploymentController::new(&context(client), None).unwrap();

    d.read_pods(false).await;
    d.begin_request_window();
    d.http_request_all_pods(page, false).await;
    d.validate_pod_log(4, ua, false).await;

    assert_eq!(
        messages(&mut d),
        vec![
            "Not enough lines of output containing user agent to meet pod request count",
            "Not enough lines of output containing user agent to meet pod request count and service request count - found 3, not 6",
        ]
    );
    server.await.unwrap();
}
