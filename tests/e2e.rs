//! End-to-end: serve the airdrop blob over HTTP and drive the coordinator

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::routing::get;
use axum::Router;
use gnot_lookup::lookup_client::{channel_sink, BalanceStore, PersistentStore};
use gnot_lookup::lookup_core::Dataset;
use gnot_lookup::{
    format_amount, CoordinatorBuilder, LoadEvent, LoadState, LookupConfig, Phase, QueryOutcome,
    StorageMode,
};

const BLOB: &str = r#"{
    "g1jg8mtutu9khhfwc4nxmuhcpftf0pajdhfvsqf5": 47056306,
    "g1us8428u2a5satrlxzagqqa5m6vmuze025anjlj": "1000000",
    "g1manfred47kzduec920z88wfr64ylksmdcedlf5": 0,
    "g1broken": "not-a-number"
}"#;

async fn serve_blob() -> SocketAddr {
    let app = Router::new().route(
        "/airdrop.json",
        get(|| async { Bytes::from_static(BLOB.as_bytes()) }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn last_phase(events: &mut tokio::sync::mpsc::UnboundedReceiver<LoadEvent>) -> Option<Phase> {
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let LoadEvent::Status(status) = event {
            last = Some(status.phase);
        }
    }
    last
}

#[tokio::test]
async fn test_served_blob_matches_parsed_dataset() {
    let addr = serve_blob().await;
    let resp = reqwest::get(format!("http://{}/airdrop.json", addr))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let bytes = resp.bytes().await.unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let entries = raw.as_object().unwrap();
    assert_eq!(entries.len(), 4);

    let dataset = Dataset::from_json(&bytes).unwrap();
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.skipped(), 1);
    assert_eq!(
        entries["g1jg8mtutu9khhfwc4nxmuhcpftf0pajdhfvsqf5"],
        serde_json::json!(47_056_306)
    );
}

#[tokio::test]
async fn test_memory_mode_over_http() {
    let addr = serve_blob().await;
    let config = LookupConfig::new(
        StorageMode::Memory,
        format!("http://{}/airdrop.json", addr),
    );

    let (sink, mut events) = channel_sink();
    let coordinator = CoordinatorBuilder::new(config).sink(sink).build().unwrap();
    coordinator.initialize().unwrap();
    coordinator.wait().await;

    assert_eq!(coordinator.state(), LoadState::Loaded);
    assert_eq!(last_phase(&mut events), Some(Phase::Complete));

    let outcome = coordinator
        .query("g1jg8mtutu9khhfwc4nxmuhcpftf0pajdhfvsqf5")
        .unwrap();
    assert_eq!(outcome, QueryOutcome::Found(47_056_306));
    assert_eq!(format_amount(47_056_306), "47.056306");

    assert_eq!(
        coordinator
            .query("g1us8428u2a5satrlxzagqqa5m6vmuze025anjlj")
            .unwrap(),
        QueryOutcome::Found(1_000_000)
    );
    assert_eq!(
        coordinator.query("g1broken").unwrap(),
        QueryOutcome::NotFoundFinal
    );
}

#[tokio::test]
async fn test_persistent_mode_survives_restart() {
    let addr = serve_blob().await;
    let dir = tempfile::tempdir().unwrap();
    let config = LookupConfig {
        data_dir: dir.path().to_path_buf(),
        batch_size: 2,
        ..LookupConfig::new(
            StorageMode::Persistent,
            format!("http://{}/airdrop.json", addr),
        )
    };

    {
        let coordinator = CoordinatorBuilder::new(config.clone()).build().unwrap();
        coordinator.initialize().unwrap();
        coordinator.wait().await;
        assert_eq!(coordinator.state(), LoadState::Loaded);
    }

    {
        let store = PersistentStore::open(config.store_path()).unwrap();
        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(store.stored_version().unwrap().as_deref(), Some("1"));
    }

    // Dataset URL now points nowhere; a matching version must not refetch
    let offline = LookupConfig {
        dataset_url: "http://127.0.0.1:9/airdrop.json".to_string(),
        ..config
    };
    let (sink, mut events) = channel_sink();
    let coordinator = CoordinatorBuilder::new(offline).sink(sink).build().unwrap();
    coordinator.initialize().unwrap();
    coordinator.wait().await;

    assert_eq!(coordinator.state(), LoadState::Loaded);
    assert_eq!(last_phase(&mut events), Some(Phase::Complete));
    assert_eq!(
        coordinator
            .query("g1manfred47kzduec920z88wfr64ylksmdcedlf5")
            .unwrap(),
        QueryOutcome::Found(0)
    );
}

#[tokio::test]
async fn test_missing_dataset_reports_fetch_failure() {
    let addr = serve_blob().await;
    let config = LookupConfig::new(
        StorageMode::Memory,
        format!("http://{}/missing.json", addr),
    );

    let (sink, mut events) = channel_sink();
    let coordinator = CoordinatorBuilder::new(config).sink(sink).build().unwrap();
    coordinator.initialize().unwrap();
    coordinator.wait().await;

    assert_eq!(coordinator.state(), LoadState::Uninitialized);

    let mut error = None;
    while let Ok(event) = events.try_recv() {
        if let LoadEvent::Status(status) = event {
            if status.phase == Phase::Error {
                error = Some(status.message);
            }
        }
    }
    let message = error.expect("error event");
    assert!(message.contains("HTTP 404"), "unexpected message: {}", message);
}
