//! End-to-end tests: a real listener serving the gateway, driven over HTTP.
//!
//! The upstream is an in-process recorder, so nothing leaves the machine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relaygate::server;
use relaygate_core::Gateway;
use relaygate_core::forwarder::UpstreamClient;
use relaygate_core::test_utils::{RecordingUpstream, TEST_SECRET, TestConfig};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Harness {
    addr: SocketAddr,
    upstream: Arc<RecordingUpstream>,
    stop: Option<oneshot::Sender<()>>,
    server: JoinHandle<std::io::Result<()>>,
}

impl Harness {
    async fn start(config: TestConfig, upstream: RecordingUpstream) -> Self {
        let upstream = Arc::new(upstream);
        let client: Arc<dyn UpstreamClient> = upstream.clone();
        let gateway = Arc::new(Gateway::with_upstream(Arc::new(config), client));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(server::serve(listener, gateway, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            upstream,
            stop: Some(stop),
            server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(mut self) -> std::io::Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.server)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

// ===========================================
// Forwarding
// ===========================================

#[tokio::test]
async fn test_proxies_target_over_real_listener() {
    let harness = Harness::start(
        TestConfig::new(),
        RecordingUpstream::ok("hello from upstream").with_header("content-type", "text/plain"),
    )
    .await;

    let resp = client()
        .get(harness.url(&format!("/{TEST_SECRET}/https://example.com/data?page=2")))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.headers()["x-proxied-by"], "relaygate");
    assert_eq!(resp.text().await.unwrap(), "hello from upstream");

    let sent = harness.upstream.last_request().unwrap();
    assert_eq!(sent.url.as_str(), "https://example.com/data?page=2");
    assert_eq!(harness.upstream.calls(), 1);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_post_body_reaches_upstream() {
    let harness = Harness::start(TestConfig::new(), RecordingUpstream::ok("created")).await;

    let resp = client()
        .post(harness.url(&format!("/{TEST_SECRET}/https://api.example.com/items")))
        .body("{\"name\":\"widget\"}")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let sent = harness.upstream.last_request().unwrap();
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.body.as_deref(), Some(&b"{\"name\":\"widget\"}"[..]));

    harness.shutdown().await.unwrap();
}

// ===========================================
// Rejections
// ===========================================

#[tokio::test]
async fn test_wrong_credential_never_fetches() {
    let harness = Harness::start(TestConfig::new(), RecordingUpstream::ok("secret")).await;

    let resp = client()
        .get(harness.url("/not-the-key/https://example.com/"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let body: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert!(body["error"].is_string());
    assert_eq!(harness.upstream.calls(), 0);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_private_target_forbidden() {
    let harness = Harness::start(TestConfig::new(), RecordingUpstream::ok("internal")).await;

    for target in [
        "http://127.0.0.1:8080/admin",
        "http://10.0.0.5/",
        "http://169.254.169.254/latest/meta-data/",
    ] {
        let resp = client()
            .get(harness.url(&format!("/{TEST_SECRET}/{target}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403, "target {target}");
    }
    assert_eq!(harness.upstream.calls(), 0);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let harness = Harness::start(TestConfig::new(), RecordingUpstream::unreachable()).await;

    let resp = client()
        .get(harness.url(&format!("/{TEST_SECRET}/https://down.example.com/")))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_burst_limit_over_http() {
    let harness = Harness::start(
        TestConfig::new().with_burst_limit(2, 60),
        RecordingUpstream::ok("ok"),
    )
    .await;
    let client = client();
    let url = harness.url(&format!("/{TEST_SECRET}/https://example.com/"));

    assert_eq!(client.get(&url).send().await.unwrap().status(), 200);
    assert_eq!(client.get(&url).send().await.unwrap().status(), 200);

    let limited = client.get(&url).send().await.unwrap();
    assert_eq!(limited.status(), 429);
    assert!(limited.headers().contains_key("retry-after"));
    assert_eq!(harness.upstream.calls(), 2);

    harness.shutdown().await.unwrap();
}

// ===========================================
// Preflight and diagnostics
// ===========================================

#[tokio::test]
async fn test_preflight_without_credential() {
    let harness = Harness::start(TestConfig::new(), RecordingUpstream::ok("")).await;

    let resp = client()
        .request(reqwest::Method::OPTIONS, harness.url("/anything"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 204);
    assert_eq!(resp.headers()["access-control-max-age"], "86400");
    assert_eq!(harness.upstream.calls(), 0);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_debug_ip_reports_peer_address() {
    let harness = Harness::start(
        TestConfig::new().with_diagnostics(true),
        RecordingUpstream::ok(""),
    )
    .await;

    let resp = client().get(harness.url("/_debug_ip")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["identity"], "127.0.0.1");
    assert_eq!(body["matches"], true);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_platform_header_sets_identity_from_trusted_proxy() {
    let harness = Harness::start(
        TestConfig::new()
            .with_diagnostics(true)
            .with_allowed_proxy_ips(vec!["127.0.0.1"]),
        RecordingUpstream::ok(""),
    )
    .await;

    let resp = client()
        .get(harness.url("/_debug_ip"))
        .header("cf-connecting-ip", "203.0.113.9")
        .header("x-forwarded-for", "1.2.3.4")
        .send()
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["identity"], "203.0.113.9");

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_platform_header_ignored_by_default() {
    let harness = Harness::start(
        TestConfig::new().with_diagnostics(true),
        RecordingUpstream::ok(""),
    )
    .await;

    let resp = client()
        .get(harness.url("/_debug_ip"))
        .header("cf-connecting-ip", "203.0.113.9")
        .send()
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["identity"], "127.0.0.1");

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stats_count_requests() {
    let harness = Harness::start(
        TestConfig::new().with_diagnostics(true),
        RecordingUpstream::ok("ok"),
    )
    .await;
    let client = client();

    client
        .get(harness.url(&format!("/{TEST_SECRET}/https://example.com/")))
        .send()
        .await
        .unwrap();
    client
        .get(harness.url("/wrong/https://example.com/"))
        .send()
        .await
        .unwrap();

    let resp = client.get(harness.url("/_stats")).send().await.unwrap();
    let body: Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["requests"], 3);
    assert_eq!(body["proxied"], 1);
    assert_eq!(body["rejected"], 1);

    harness.shutdown().await.unwrap();
}

// ===========================================
// Shutdown
// ===========================================

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let harness = Harness::start(TestConfig::new(), RecordingUpstream::ok("ok")).await;
    let addr = harness.addr;

    harness.shutdown().await.unwrap();

    let result = client()
        .get(format!("http://{addr}/{TEST_SECRET}/https://example.com/"))
        .send()
        .await;
    assert!(result.is_err());
}
