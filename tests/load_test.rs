//! Load testing for the gateway's cached path.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gateway_sdk::{GatewayClient, GenerateRequest};

use llm_gateway::providers::ProviderKind;

mod common;

#[tokio::test]
async fn test_cached_load_performance() {
    // 1. Setup mock provider
    let backend_addr: SocketAddr = "127.0.0.1:28281".parse().unwrap();
    let gateway_addr: SocketAddr = "127.0.0.1:28282".parse().unwrap();

    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    common::start_programmable_backend(backend_addr, move |_| {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            (200, common::completion("{\"answer\": 42}"))
        }
    })
    .await;

    // 2. Start gateway
    let (shutdown, gateway) = common::start_gateway(common::gateway_config(gateway_addr, backend_addr)).await;
    gateway.credentials().put("load", ProviderKind::OpenAi, "sk-load").await.unwrap();

    let sdk = Arc::new(GatewayClient::with_client(common::client(), &format!("http://{}", gateway_addr)));
    assert!(sdk.health().await.unwrap());

    // 3. Warm the cache
    let request = GenerateRequest::text("openai", "load", "What is the answer?").with_format("json");
    let (status, warm) = sdk.generate(&request).await.unwrap();
    assert_eq!(status, 200);
    assert!(warm.is_success());
    assert!(!warm.cached);

    // 4. Run load test
    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let sdk = sdk.clone();
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            let mut hits = 0;
            for _ in 0..requests_per_task {
                let (status, response) = sdk.generate(&request).await.unwrap();
                if status == 200 && response.cached && response.content["answer"] == 42 {
                    hits += 1;
                }
            }
            hits
        }));
    }

    let mut cached = 0;
    for handle in handles {
        cached += handle.await.unwrap();
    }
    let elapsed = start.elapsed();

    println!(
        "Served {} cached requests in {:?} ({:.0} req/s)",
        cached,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64()
    );

    // 5. Every request after warm-up is a hit; the provider saw one call
    assert_eq!(cached, total_requests);
    assert_eq!(call_count.load(Ordering::SeqCst), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_sdk_reports_classified_errors() {
    let backend_addr: SocketAddr = "127.0.0.1:28283".parse().unwrap();
    let gateway_addr: SocketAddr = "127.0.0.1:28284".parse().unwrap();
    common::start_programmable_backend(backend_addr, |_| async { (200, common::filtered_completion()) }).await;

    let (shutdown, _gateway) = common::start_gateway(common::gateway_config(gateway_addr, backend_addr)).await;
    let sdk = GatewayClient::with_client(common::client(), &format!("http://{}", gateway_addr))
        .with_admin_key(common::ADMIN_KEY);

    assert_eq!(sdk.put_credential("sdk-user", "openai", "sk-sdk").await.unwrap(), 204);

    let (status, response) = sdk
        .generate(&GenerateRequest::text("openai", "sdk-user", "blocked"))
        .await
        .unwrap();
    assert_eq!(status, 422);
    assert!(!response.is_success());
    assert_eq!(response.error_kind(), Some("ContentPolicy"));

    let status = sdk.status().await.unwrap();
    assert_eq!(status["storedCredentials"], 1);

    assert_eq!(sdk.delete_credential("sdk-user", "openai").await.unwrap(), 204);

    shutdown.trigger();
}
