//! End-to-end pipeline scenarios over scripted fetches and an in-memory
//! store.

use std::sync::Arc;

use onionwatch::{
    models::{
        alert::{AlertSeverity, AlertType},
        scan::UrlStatus,
    },
    persistence::{traits::Store, SqliteStore},
    scanner::ScanPipeline,
    test_helpers::{
        fetch_failure, online_html, test_pipeline, CleanScanner, FlaggingScanner, StaticDownloader,
        StaticFetcher,
    },
};

async fn memory_store() -> Arc<SqliteStore> {
    let store = SqliteStore::new("sqlite::memory:").await.expect("store should connect");
    store.run_migrations().await.expect("migrations should run");
    Arc::new(store)
}

fn pipeline_over(
    store: Arc<SqliteStore>,
    fetcher: StaticFetcher,
    downloader: StaticDownloader,
) -> ScanPipeline {
    test_pipeline(store, Arc::new(fetcher), Arc::new(downloader), Arc::new(CleanScanner))
}

#[tokio::test]
async fn marketplace_page_is_scored_and_classified() {
    let store = memory_store().await;
    let fetcher = StaticFetcher::new().with(
        "http://example1.onion/",
        online_html(
            "<html><head><title>Dark Market</title></head><body>Dark Market buy carding escrow \
             contact: admin@shop.test BTC 1BoatSLRHtKNngkdXEeobR76b53LETtpyT</body></html>",
        ),
    );
    let pipeline = pipeline_over(Arc::clone(&store), fetcher, StaticDownloader::new());

    let record = pipeline.scan("http://example1.onion/").await.unwrap();

    assert_eq!(record.url_status, UrlStatus::Online);
    assert_eq!(record.threat_score, 74);
    assert_eq!(record.risk_level.as_str(), "HIGH");
    assert_eq!(record.category, "Illegal Marketplace");
    assert!(record.keywords.contains(&"marketplace".to_string()));
    assert!(record.keywords.contains(&"carding".to_string()));
    assert!(record.keywords.contains(&"escrow".to_string()));
    assert_eq!(record.emails, vec!["admin@shop.test".to_string()]);
    assert_eq!(record.crypto_addresses, vec!["1BoatSLRHtKNngkdXEeobR76b53LETtpyT".to_string()]);
}

#[tokio::test]
async fn email_reused_across_two_targets_raises_one_high_alert() {
    let store = memory_store().await;
    let fetcher = StaticFetcher::new()
        .with("http://site-a.onion/", online_html("<body>reach admin@x.test</body>"))
        .with("http://site-b.onion/", online_html("<body>mail admin@x.test today</body>"));
    let pipeline = pipeline_over(Arc::clone(&store), fetcher, StaticDownloader::new());

    pipeline.scan("http://site-a.onion/").await.unwrap();
    pipeline.scan("http://site-b.onion/").await.unwrap();

    let alerts = store.list_alerts(None, 100).await.unwrap();
    let reuse: Vec<_> =
        alerts.iter().filter(|a| a.alert_type == AlertType::IocReuse).collect();
    assert_eq!(reuse.len(), 1);
    assert_eq!(reuse[0].severity, AlertSeverity::High);
    assert_eq!(reuse[0].target, "http://site-b.onion/");
    assert_eq!(reuse[0].details["reuse_count"], 2);
    assert_eq!(reuse[0].details["ioc_value"], "admin@x.test");
}

#[tokio::test]
async fn timeout_after_online_raises_a_status_change_alert() {
    let store = memory_store().await;
    let fetcher = StaticFetcher::new()
        .with("http://example.onion/", online_html("<body>steady content</body>"))
        .with("http://example.onion/", fetch_failure(UrlStatus::Timeout));
    let pipeline = pipeline_over(Arc::clone(&store), fetcher, StaticDownloader::new());

    pipeline.scan("http://example.onion/").await.unwrap();
    let timed_out = pipeline.scan("http://example.onion/").await.unwrap();

    assert_eq!(timed_out.url_status, UrlStatus::Timeout);
    assert_eq!(timed_out.status_code, None);
    assert!(timed_out.emails.is_empty());
    assert!(timed_out.content_hash.is_none());

    let alerts = store.list_alerts(None, 100).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::StatusChange);
    assert_eq!(alerts[0].severity, AlertSeverity::Medium);
    assert!(alerts[0].reason.contains("ONLINE"));
    assert!(alerts[0].reason.contains("TIMEOUT"));
}

#[tokio::test]
async fn content_change_fires_once_and_settles() {
    let store = memory_store().await;
    let fetcher = StaticFetcher::new()
        .with("http://example.onion/", online_html("<body>A</body>"))
        .with("http://example.onion/", online_html("<body>B</body>"));
    // The queue keeps replaying the last outcome, so the third scan sees "B"
    // again.
    let pipeline = pipeline_over(Arc::clone(&store), fetcher, StaticDownloader::new());

    let first = pipeline.scan("http://example.onion/").await.unwrap();
    let second = pipeline.scan("http://example.onion/").await.unwrap();
    let third = pipeline.scan("http://example.onion/").await.unwrap();

    assert!(!first.content_changed);
    assert!(second.content_changed);
    assert_ne!(first.content_hash, second.content_hash);
    assert!(!third.content_changed);
    assert_eq!(second.content_hash, third.content_hash);

    let alerts = store.list_alerts(None, 100).await.unwrap();
    let changes: Vec<_> =
        alerts.iter().filter(|a| a.alert_type == AlertType::ContentChange).collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].severity, AlertSeverity::Low);
}

#[tokio::test]
async fn flagged_download_pivots_the_scan_to_malware() {
    let store = memory_store().await;
    let fetcher = StaticFetcher::new().with(
        "http://files-site.onion/",
        online_html(r#"<body>grab <a href="/payload.exe">the tool</a></body>"#),
    );
    let downloader = StaticDownloader::new().with_file(
        "http://files-site.onion/payload.exe",
        "application/octet-stream",
        b"MZ\x90\x00fake-executable-body",
    );
    let pipeline = test_pipeline(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::new(fetcher),
        Arc::new(downloader),
        Arc::new(FlaggingScanner { threat_name: "Eicar-Test-Signature".to_string() }),
    );

    let record = pipeline.scan("http://files-site.onion/").await.unwrap();

    assert!(record.threat_indicators.malware_detected);
    assert_eq!(record.file_analyses.len(), 1);
    let analysis = &record.file_analyses[0];
    assert!(analysis.malware.detected);
    assert_eq!(analysis.malware.threats[0].name, "Eicar-Test-Signature");
    assert!(analysis.carving.signatures.iter().any(|s| s.contains("DOS/PE executable")));
    assert_eq!(analysis.file_hash.len(), 64);

    // The clean baseline for the same text scores 25 lower.
    assert!(record.threat_score >= 25);

    let alerts = store.list_alerts(None, 100).await.unwrap();
    let malware: Vec<_> =
        alerts.iter().filter(|a| a.alert_type == AlertType::MalwareDetected).collect();
    assert_eq!(malware.len(), 1);
    assert_eq!(malware[0].severity, AlertSeverity::High);
    assert!(malware[0].reason.contains("Eicar-Test-Signature"));
}

#[tokio::test]
async fn shared_payload_across_targets_raises_file_hash_reuse() {
    let store = memory_store().await;
    let fetcher = StaticFetcher::new()
        .with(
            "http://files-a.onion/",
            online_html(r#"<body><a href="/drop.bin">drop</a></body>"#),
        )
        .with(
            "http://files-b.onion/",
            online_html(r#"<body><a href="/drop.bin">drop</a></body>"#),
        );
    let downloader = StaticDownloader::new()
        .with_file("http://files-a.onion/drop.bin", "application/octet-stream", b"same payload")
        .with_file("http://files-b.onion/drop.bin", "application/octet-stream", b"same payload");
    let pipeline = test_pipeline(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::new(fetcher),
        Arc::new(downloader),
        Arc::new(CleanScanner),
    );

    pipeline.scan("http://files-a.onion/").await.unwrap();
    pipeline.scan("http://files-b.onion/").await.unwrap();

    let alerts = store.list_alerts(None, 100).await.unwrap();
    let reuse: Vec<_> =
        alerts.iter().filter(|a| a.alert_type == AlertType::IocReuse).collect();
    assert_eq!(reuse.len(), 1);
    assert_eq!(reuse[0].severity, AlertSeverity::Medium);
    assert_eq!(reuse[0].details["ioc_type"], "file_hash");
}

#[tokio::test]
async fn unknown_target_is_recorded_offline() {
    let store = memory_store().await;
    let pipeline =
        pipeline_over(Arc::clone(&store), StaticFetcher::new(), StaticDownloader::new());

    let record = pipeline.scan("http://gone.onion/").await.unwrap();
    assert_eq!(record.url_status, UrlStatus::Offline);
    assert_eq!(record.title, "[OFFLINE] Unable to fetch content");
    assert_eq!(record.threat_score, 0);

    let history = store.history(10, 0).await.unwrap();
    assert_eq!(history.len(), 1);
}
