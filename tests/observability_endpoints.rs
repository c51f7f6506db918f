//! Metrics and health endpoints over real HTTP.

use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use priority_proxy::observability::metrics;

#[tokio::test]
async fn health_and_metrics_are_served_until_shutdown() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::record_request("detect", metrics::RequestStatus::Completed);
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = broadcast::channel(1);
    let server = tokio::spawn(metrics::serve(listener, handle, rx));

    let client = reqwest::Client::new();
    let health: serde_json::Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let response = client.get(format!("http://{addr}/metrics")).send().await.unwrap();
    assert!(response.status().is_success());
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    let body = response.text().await.unwrap();
    assert!(body.contains(r#"priority_proxy_requests_total{command="detect",status="completed"} 1"#));

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("metrics server did not stop")
        .unwrap()
        .unwrap();
}
