//! End-to-end lifecycle tests against a real listener.
//!
//! Requests are written as raw HTTP/1.1 with `Connection: close`, so each
//! response is simply everything read until EOF.

use std::net::SocketAddr;
use std::time::Duration;

use gantry::{Capability, CapabilitySet, Error, Gateway, Request, Response, ServerConfig, State};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const ALWAYS: [Capability; 11] = [
    Capability::FunctionLister,
    Capability::DeployFunction,
    Capability::DeleteFunction,
    Capability::UpdateFunction,
    Capability::FunctionStatus,
    Capability::ScaleFunction,
    Capability::Info,
    Capability::Secrets,
    Capability::Logs,
    Capability::ListNamespaces,
    Capability::FunctionProxy,
];

async fn ok(_req: Request) -> Response {
    Response::text("ok")
}

/// A proxy that sleeps for the number of milliseconds named in the path,
/// e.g. `/function/sleep/250`.
async fn sleepy_proxy(req: Request) -> Response {
    let millis = req.param("params").and_then(|p| p.parse().ok()).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Response::text(format!("slept {millis}"))
}

fn capabilities() -> CapabilitySet {
    ALWAYS
        .into_iter()
        .fold(CapabilitySet::new(), |set, cap| set.with(cap, ok))
        .with(Capability::FunctionProxy, sleepy_proxy)
}

fn ephemeral() -> ServerConfig {
    ServerConfig { tcp_port: Some(0), ..ServerConfig::default() }
}

fn loopback(addr: SocketAddr) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], addr.port()))
}

async fn send(addr: SocketAddr, method: &str, path: &str, extra_headers: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(loopback(addr)).await?;
    let head = format!("{method} {path} HTTP/1.1\r\nHost: gantry\r\nConnection: close\r\n{extra_headers}\r\n");
    stream.write_all(head.as_bytes()).await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or_default()
}

#[tokio::test]
async fn serves_bound_routes_and_reports_state() {
    let gateway = Gateway::new(ephemeral(), capabilities()).unwrap();
    let running = gateway.start().await.unwrap();
    assert_eq!(running.state(), State::Serving);
    let addr = running.local_addr();

    let res = send(addr, "GET", "/system/functions", "").await.unwrap();
    assert!(status_line(&res).contains("200"), "{res}");

    let res = send(addr, "GET", "/nope", "").await.unwrap();
    assert!(status_line(&res).contains("404"), "{res}");

    let res = send(addr, "GET", "/system/namespace/foo", "").await.unwrap();
    assert!(status_line(&res).contains("501"), "{res}");

    let states = running.subscribe();
    running.shutdown().await.unwrap();
    assert_eq!(*states.borrow(), State::Stopped);
}

#[tokio::test]
async fn in_flight_request_completes_during_shutdown() {
    let gateway = Gateway::new(ephemeral(), capabilities())
        .unwrap()
        .shutdown_timeout(Duration::from_secs(5));
    let running = gateway.start().await.unwrap();
    let addr = running.local_addr();

    let client = tokio::spawn(async move { send(addr, "GET", "/function/sleep/400", "").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.shutdown().await.unwrap();

    let res = client.await.unwrap().unwrap();
    assert!(status_line(&res).contains("200"), "{res}");
    assert!(res.ends_with("slept 400"), "{res}");

    // The listener is gone.
    assert!(TcpStream::connect(loopback(addr)).await.is_err());
}

#[tokio::test]
async fn request_past_the_deadline_forces_shutdown() {
    let gateway = Gateway::new(ephemeral(), capabilities())
        .unwrap()
        .shutdown_timeout(Duration::from_millis(200));
    let running = gateway.start().await.unwrap();
    let addr = running.local_addr();
    let states = running.subscribe();

    let client = tokio::spawn(async move { send(addr, "GET", "/function/sleep/5000", "").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = running.shutdown().await.unwrap_err();
    assert!(matches!(err, Error::ShutdownTimeout(d) if d == Duration::from_millis(200)));
    assert_eq!(*states.borrow(), State::Stopped);

    // The abandoned client sees the connection close without a response.
    let res = client.await.unwrap().unwrap_or_default();
    assert!(!res.contains("slept"), "{res}");
}

#[tokio::test]
async fn serve_until_drains_on_a_synthetic_signal() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let gateway = Gateway::new(ephemeral(), capabilities()).unwrap();

    let server = tokio::spawn(gateway.serve_until(async move {
        let _ = rx.await;
        Ok(())
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let config = ServerConfig { tcp_port: Some(port), ..ServerConfig::default() };
    let gateway = Gateway::new(config, capabilities()).unwrap();
    match gateway.start().await {
        Err(Error::Bind { addr, .. }) => assert_eq!(addr.port(), port),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second bind on port {port} succeeded"),
    }
}

#[tokio::test]
async fn basic_auth_guards_management_routes_only() {
    let secrets = tempfile::tempdir().unwrap();
    std::fs::write(secrets.path().join("basic-auth-user"), "admin\n").unwrap();
    std::fs::write(secrets.path().join("basic-auth-password"), "secret\n").unwrap();

    let config = ServerConfig {
        enable_basic_auth: true,
        secret_mount_path: secrets.path().to_owned(),
        ..ephemeral()
    };
    let running = Gateway::new(config, capabilities()).unwrap().start().await.unwrap();
    let addr = running.local_addr();

    let res = send(addr, "GET", "/system/functions", "").await.unwrap();
    assert!(status_line(&res).contains("401"), "{res}");
    assert!(res.to_ascii_lowercase().contains("www-authenticate: basic realm=\"restricted\""), "{res}");

    // admin:secret
    let res = send(addr, "GET", "/system/functions", "Authorization: Basic YWRtaW46c2VjcmV0\r\n")
        .await
        .unwrap();
    assert!(status_line(&res).contains("200"), "{res}");

    for path in ["/function/echo", "/metrics"] {
        let res = send(addr, "GET", path, "").await.unwrap();
        assert!(status_line(&res).contains("200"), "{path}: {res}");
    }

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn metrics_endpoint_counts_by_template() {
    let running = Gateway::new(ephemeral(), capabilities()).unwrap().start().await.unwrap();
    let addr = running.local_addr();

    for path in ["/function/a", "/function/b/", "/function/c/0", "/function/a"] {
        send(addr, "GET", path, "").await.unwrap();
    }

    let res = send(addr, "GET", "/metrics", "").await.unwrap();
    assert!(
        res.contains(r#"http_requests_total{code="200",method="GET",path="/function/{name}"} 4"#),
        "{res}"
    );

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn extra_routes_can_be_added_before_start() {
    let mut gateway = Gateway::new(ephemeral(), capabilities()).unwrap();
    gateway
        .router_mut()
        .route(
            &gantry::RouteSpec::new("/system/version", gantry::Methods::one(http::Method::GET)),
            |_req: Request| async { "v1" },
        )
        .unwrap();

    let running = gateway.start().await.unwrap();
    let res = send(running.local_addr(), "GET", "/system/version", "").await.unwrap();
    assert!(res.ends_with("v1"), "{res}");
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn write_timeout_answers_503_and_is_still_counted() {
    let config = ServerConfig { write_timeout: Duration::from_millis(100), ..ephemeral() };
    let gateway = Gateway::new(config, capabilities()).unwrap();
    let metrics = gateway.metrics().clone();
    let running = gateway.start().await.unwrap();
    let addr = running.local_addr();

    let res = send(addr, "GET", "/function/sleep/500", "").await.unwrap();
    assert!(status_line(&res).contains("503"), "{res}");
    assert!(res.ends_with("handler exceeded write timeout"), "{res}");
    assert_eq!(metrics.request_count("/function/{name}"), 1);
    assert_eq!(metrics.in_flight("/function/{name}"), 0);

    let res = send(addr, "GET", "/function/sleep/0", "").await.unwrap();
    assert!(status_line(&res).contains("200"), "{res}");

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn read_timeout_answers_408_for_a_stalled_body() {
    let config = ServerConfig { read_timeout: Duration::from_millis(100), ..ephemeral() };
    let running = Gateway::new(config, capabilities()).unwrap().start().await.unwrap();

    // Announces a body that never arrives.
    let res = send(running.local_addr(), "POST", "/function/echo", "Content-Length: 10\r\n").await.unwrap();
    assert!(status_line(&res).contains("408"), "{res}");

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn percent_encoded_names_reach_their_route() {
    let running = Gateway::new(ephemeral(), capabilities()).unwrap().start().await.unwrap();

    let res = send(running.local_addr(), "GET", "/system/function/a%2Db", "").await.unwrap();
    assert!(status_line(&res).contains("200"), "{res}");

    running.shutdown().await.unwrap();
}
