//! Shared utilities for gateway integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use llm_gateway::config::{GatewayConfig, ProviderConfig, RetryConfig};
use llm_gateway::lifecycle::{self, Shutdown};
use llm_gateway::providers::ProviderKind;
use llm_gateway::vault::MasterKey;
use llm_gateway::{Gateway, HttpServer};

pub const ADMIN_KEY: &str = "integration-admin-key";

/// Start a programmable mock provider. `f` receives the raw request text.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            401 => "401 Unauthorized",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Read headers and a Content-Length body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Chat completion body with a single answer.
pub fn completion(content: &str) -> String {
    serde_json::json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

/// Chat completion body withheld by the content filter.
pub fn filtered_completion() -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": null }, "finish_reason": "content_filter" }]
    })
    .to_string()
}

/// Config pointing an OpenAI-compatible provider at `backend_addr`.
pub fn gateway_config(gateway_addr: SocketAddr, backend_addr: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = gateway_addr.to_string();
    config.vault.credentials_path = None;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.observability.metrics_enabled = false;

    let mut provider = ProviderConfig::new(ProviderKind::OpenAi);
    provider.base_url = Some(format!("http://{}/v1", backend_addr));
    provider.timeout_secs = Some(5);
    provider.retries = Some(RetryConfig {
        max_retries: 2,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        ..RetryConfig::default()
    });
    config.providers.push(provider);
    config
}

/// Build and serve a gateway. Dropping or triggering the returned shutdown stops it.
pub async fn start_gateway(config: GatewayConfig) -> (Shutdown, Gateway) {
    let components = lifecycle::build_gateway(&config, &MasterKey::generate()).unwrap();
    let gateway = components.gateway.clone();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(&config, components.gateway.clone());
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (shutdown, gateway)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
