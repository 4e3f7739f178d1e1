//! RPC surface tests against a pool set on the fake runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use hatch_common::events::Emitter;
use hatch_common::Params;
use hatch_core::PoolSet;
use hatch_runtime::{ContainerRuntime, FakeRuntime};
use hatch_server::{serve, AppState};

const CONFIG: &str = r#"
pools:
  cache:
    image: redis:7
    size: 1
    port: 6379
"#;

async fn start_server() -> (String, Arc<PoolSet>, CancellationToken) {
    let file = hatch_config::parse(CONFIG).unwrap();
    let fake = FakeRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = fake;
    let pools = Arc::new(PoolSet::from_file(&file, runtime, &Emitter::noop()).unwrap());

    tokio::time::timeout(Duration::from_secs(5), pools.wait_ready())
        .await
        .expect("pool must become ready")
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let state = AppState::new(pools.clone());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = serve(listener, state, shutdown).await;
        });
    }

    (format!("http://{addr}"), pools, shutdown)
}

#[tokio::test]
async fn checkout_and_return_round_trip() {
    let (base, pools, shutdown) = start_server().await;
    let client = reqwest::Client::new();

    let params: Params = client
        .post(format!("{base}/pools/cache/checkout"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!params.id.is_empty());
    assert_eq!(params.hostname, "127.0.0.1");

    let response = client
        .post(format!("{base}/pools/cache/return"))
        .json(&serde_json::json!({ "id": params.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    shutdown.cancel();
    pools.stop().await;
}

#[tokio::test]
async fn unknown_pool_is_not_found() {
    let (base, pools, shutdown) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/pools/nope/checkout"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.cancel();
    pools.stop().await;
}

#[tokio::test]
async fn unknown_lease_return_is_not_found() {
    let (base, pools, shutdown) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/pools/cache/return"))
        .json(&serde_json::json!({ "id": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown.cancel();
    pools.stop().await;
}

#[tokio::test]
async fn pool_listing_reports_counts() {
    let (base, pools, shutdown) = start_server().await;
    let client = reqwest::Client::new();

    let listing: serde_json::Value = client
        .get(format!("{base}/pools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = listing.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "cache");
    assert_eq!(entries[0]["target"], 1);

    shutdown.cancel();
    pools.stop().await;
}
