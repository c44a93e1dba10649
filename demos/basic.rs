//! Minimal gantry provider — an in-memory function list behind the full
//! gateway surface.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/system/functions
//!   curl -X POST http://localhost:8080/system/functions -d '{"service":"echo"}'
//!   curl http://localhost:8080/function/echo/some/path
//!   curl http://localhost:8080/system/namespace/dev        # 501
//!   curl http://localhost:8080/metrics
//!   curl http://localhost:8080/healthz

use std::sync::{Arc, Mutex};

use gantry::{Capability, CapabilitySet, Request, Response, ServerConfig, health};
use http::StatusCode;
use tracing_subscriber::EnvFilter;

type Store = Arc<Mutex<Vec<String>>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gantry=debug".into()))
        .init();

    let store: Store = Arc::default();

    let capabilities = CapabilitySet::new()
        .with(Capability::FunctionLister, {
            let store = Arc::clone(&store);
            move |_req: Request| {
                let names = store.lock().map(|s| s.join(",")).unwrap_or_default();
                async move { Response::json(format!("[{names}]").into_bytes()) }
            }
        })
        .with(Capability::DeployFunction, {
            let store = Arc::clone(&store);
            move |req: Request| {
                let body = String::from_utf8_lossy(req.body()).into_owned();
                if let Ok(mut s) = store.lock() {
                    s.push(body);
                }
                async { StatusCode::ACCEPTED }
            }
        })
        .with(Capability::DeleteFunction, accepted)
        .with(Capability::UpdateFunction, accepted)
        .with(Capability::FunctionStatus, status)
        .with(Capability::ScaleFunction, accepted)
        .with(Capability::Info, info)
        .with(Capability::Secrets, accepted)
        .with(Capability::Logs, accepted)
        .with(Capability::ListNamespaces, namespaces)
        .with(Capability::FunctionProxy, proxy)
        .with(Capability::Health, health::liveness);

    gantry::serve(capabilities, ServerConfig::default()).await;
}

async fn accepted(_req: Request) -> StatusCode {
    StatusCode::ACCEPTED
}

async fn status(req: Request) -> Response {
    let name = req.param("name").unwrap_or_default();
    Response::json(format!(r#"{{"name":"{name}","replicas":1}}"#).into_bytes())
}

async fn info(_req: Request) -> Response {
    Response::json(br#"{"provider":{"provider":"gantry-demo"}}"#.to_vec())
}

async fn namespaces(_req: Request) -> Response {
    Response::json(br#"["default"]"#.to_vec())
}

async fn proxy(req: Request) -> Response {
    let name = req.param("name").unwrap_or_default();
    let rest = req.param("params").unwrap_or_default();
    Response::text(format!("{} {name} /{rest}\n", req.method()))
}
