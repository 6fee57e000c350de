//! Integration tests for the HTTP API.

use std::{net::SocketAddr, sync::Arc};

use onionwatch::{
    config::AppConfig,
    http_server::{self, ApiState},
    models::scan::UrlStatus,
    persistence::{traits::Store, SqliteStore},
    test_helpers::{online_html, test_pipeline, CleanScanner, ScanDraftBuilder, StaticDownloader, StaticFetcher},
};
use tokio_util::sync::CancellationToken;

struct TestServer {
    address: SocketAddr,
    client: reqwest::Client,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(store: Arc<SqliteStore>, fetcher: StaticFetcher) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let address = listener.local_addr().expect("Failed to get address");
        drop(listener); // Release the port for the app to use.

        let config = Arc::new(AppConfig::default());
        let pipeline = Arc::new(test_pipeline(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::new(fetcher),
            Arc::new(StaticDownloader::new()),
            Arc::new(CleanScanner),
        ));
        let state = ApiState::new(Arc::clone(&store) as Arc<dyn Store>, pipeline, config);

        let shutdown = CancellationToken::new();
        let server_token = shutdown.clone();
        let listen = address.to_string();
        tokio::spawn(async move {
            http_server::run_server(&listen, state, server_token)
                .await
                .expect("server should run");
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        Self { address, client: reqwest::Client::new(), shutdown }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.get(&url).send().await.expect("Request failed")
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.post(&url).json(&body).send().await.expect("Request failed")
    }

    async fn post(&self, path: &str) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.post(&url).send().await.expect("Request failed")
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        let url = format!("http://{}{}", self.address, path);
        self.client.delete(&url).send().await.expect("Request failed")
    }

    fn cleanup(self) {
        self.shutdown.cancel();
    }
}

async fn setup_store() -> Arc<SqliteStore> {
    let store = SqliteStore::new("sqlite::memory:").await.expect("store should connect");
    store.run_migrations().await.expect("migrations should run");
    Arc::new(store)
}

fn encode_path_segment(url: &str) -> String {
    url::form_urlencoded::byte_serialize(url.as_bytes()).collect()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    let resp = server.get("/health").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    server.cleanup();
}

#[tokio::test]
async fn scan_endpoint_runs_the_pipeline() {
    let fetcher = StaticFetcher::new().with(
        "http://example1.onion/",
        online_html("<body>Dark Market buy carding escrow contact: admin@shop.test BTC \
                     1BoatSLRHtKNngkdXEeobR76b53LETtpyT</body>"),
    );
    let store = setup_store().await;
    let server = TestServer::start(Arc::clone(&store), fetcher).await;

    let resp = server
        .post_json("/scan", serde_json::json!({ "url": "http://example1.onion/" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["url_status"], "ONLINE");
    assert_eq!(body["threat_score"], 74);
    assert_eq!(body["risk_level"], "HIGH");
    assert_eq!(body["category"], "Illegal Marketplace");

    // The record is persisted and visible through history.
    let resp = server.get("/history").await;
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["history"].as_array().unwrap().len(), 1);

    server.cleanup();
}

#[tokio::test]
async fn scan_endpoint_rejects_invalid_urls() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    let resp = server.post_json("/scan", serde_json::json!({ "url": "not-a-url" })).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("Invalid URL"));

    server.cleanup();
}

#[tokio::test]
async fn history_entry_returns_404_for_unknown_ids() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    let resp = server.get("/history/4242").await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Scan record not found");

    server.cleanup();
}

#[tokio::test]
async fn history_returns_full_records_by_id() {
    let store = setup_store().await;
    let record = store
        .put_scan(ScanDraftBuilder::new("http://example.onion/").threat_score(42).build())
        .await
        .unwrap();
    let server = TestServer::start(Arc::clone(&store), StaticFetcher::new()).await;

    let resp = server.get(&format!("/history/{}", record.id)).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["threat_score"], 42);
    assert_eq!(body["risk_level"], "MEDIUM");

    server.cleanup();
}

#[tokio::test]
async fn compare_requires_two_online_scans() {
    let store = setup_store().await;
    store
        .put_scan(ScanDraftBuilder::new("http://example.onion/").content_hash(Some("h1")).build())
        .await
        .unwrap();
    let server = TestServer::start(Arc::clone(&store), StaticFetcher::new()).await;

    let path = format!("/compare/{}", encode_path_segment("http://example.onion/"));
    let resp = server.get(&path).await;
    assert_eq!(resp.status(), 404);

    server.cleanup();
}

#[tokio::test]
async fn compare_reports_the_delta_between_recent_scans() {
    let store = setup_store().await;
    store
        .put_scan(
            ScanDraftBuilder::new("http://example.onion/")
                .content_hash(Some("h1"))
                .threat_score(10)
                .build(),
        )
        .await
        .unwrap();
    store
        .put_scan(
            ScanDraftBuilder::new("http://example.onion/")
                .content_hash(Some("h2"))
                .threat_score(74)
                .emails(&["admin@shop.test"])
                .category("Illegal Marketplace")
                .build(),
        )
        .await
        .unwrap();
    let server = TestServer::start(Arc::clone(&store), StaticFetcher::new()).await;

    let path = format!("/compare/{}", encode_path_segment("http://example.onion/"));
    let resp = server.get(&path).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["changes"]["threat_score_delta"], 64);
    assert_eq!(body["changes"]["risk_level_changed"], true);
    assert_eq!(body["changes"]["new_emails"], 1);
    assert_eq!(body["current"]["threat_score"], 74);
    assert_eq!(body["previous"]["threat_score"], 10);
    assert!(!body["reasons"].as_array().unwrap().is_empty());

    server.cleanup();
}

#[tokio::test]
async fn monitor_creation_validates_the_interval() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    for interval in [0, 1441] {
        let resp = server
            .post_json(
                "/monitors",
                serde_json::json!({ "url": "http://example.onion/", "interval": interval }),
            )
            .await;
        assert_eq!(resp.status(), 400, "interval {interval} should be rejected");
    }

    let resp = server
        .post_json(
            "/monitors",
            serde_json::json!({ "url": "http://example.onion/", "interval": 1440 }),
        )
        .await;
    assert_eq!(resp.status(), 201);

    server.cleanup();
}

#[tokio::test]
async fn monitor_cap_returns_conflict() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    // The default cap admits five monitors.
    for i in 0..5 {
        let resp = server
            .post_json(
                "/monitors",
                serde_json::json!({ "url": format!("http://m{i}.onion/"), "interval": 30 }),
            )
            .await;
        assert_eq!(resp.status(), 201);
    }

    let resp = server
        .post_json(
            "/monitors",
            serde_json::json!({ "url": "http://m5.onion/", "interval": 30 }),
        )
        .await;
    assert_eq!(resp.status(), 409);

    server.cleanup();
}

#[tokio::test]
async fn monitor_lifecycle_over_http() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    let resp = server
        .post_json(
            "/monitors",
            serde_json::json!({ "url": "http://example.onion/", "interval": 30 }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["paused"], false);

    let resp = server.get("/monitors").await;
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["monitors"].as_array().unwrap().len(), 1);

    let resp = server.post(&format!("/monitors/{id}/pause")).await;
    assert_eq!(resp.status(), 200);
    let paused: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(paused["paused"], true);

    let resp = server.post(&format!("/monitors/{id}/resume")).await;
    let resumed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(resumed["paused"], false);

    let resp = server.delete(&format!("/monitors/{id}")).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], true);

    let resp = server.get(&format!("/monitors/{id}")).await;
    assert_eq!(resp.status(), 404);

    server.cleanup();
}

#[tokio::test]
async fn delete_all_monitors_reports_the_count() {
    let server = TestServer::start(setup_store().await, StaticFetcher::new()).await;

    for i in 0..3 {
        server
            .post_json(
                "/monitors",
                serde_json::json!({ "url": format!("http://m{i}.onion/"), "interval": 30 }),
            )
            .await;
    }

    let resp = server.delete("/monitors/all").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], 3);

    server.cleanup();
}

#[tokio::test]
async fn alerts_are_listed_filtered_and_acknowledged() {
    let fetcher = StaticFetcher::new()
        .with("http://site-a.onion/", online_html("<body>reach admin@x.test</body>"))
        .with("http://site-b.onion/", online_html("<body>mail admin@x.test</body>"));
    let store = setup_store().await;
    let server = TestServer::start(Arc::clone(&store), fetcher).await;

    // Two scans sharing an email produce one ioc_reuse alert.
    server.post_json("/scan", serde_json::json!({ "url": "http://site-a.onion/" })).await;
    server.post_json("/scan", serde_json::json!({ "url": "http://site-b.onion/" })).await;

    let resp = server.get("/alerts?status=new").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["alert_type"], "ioc_reuse");
    let id = alerts[0]["id"].as_i64().unwrap();

    let resp = server.get("/alerts?status=sideways").await;
    assert_eq!(resp.status(), 400);

    let resp = server.post(&format!("/alerts/{id}/acknowledge")).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "acknowledged");

    // Acknowledgement is idempotent.
    let resp = server.post(&format!("/alerts/{id}/acknowledge")).await;
    assert_eq!(resp.status(), 200);

    let resp = server.get("/alerts?status=new").await;
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["alerts"].as_array().unwrap().is_empty());

    let resp = server.post("/alerts/9999/acknowledge").await;
    assert_eq!(resp.status(), 404);

    server.cleanup();
}

#[tokio::test]
async fn failed_fetches_surface_as_regular_records() {
    let store = setup_store().await;
    // No scripted page: the fetcher reads every target as OFFLINE.
    let server = TestServer::start(Arc::clone(&store), StaticFetcher::new()).await;

    let resp = server
        .post_json("/scan", serde_json::json!({ "url": "http://gone.onion/" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["url_status"], UrlStatus::Offline.as_str());
    assert_eq!(body["threat_score"], 0);

    server.cleanup();
}
