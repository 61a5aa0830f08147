//! Loopback backends shared by the gateway's tests.

use axum::body::to_bytes;
use axum::response::Response;
use axum::Router;
use reqwest::Url;
use tokio::net::TcpListener;

use crate::config::{EndpointSpec, GatewayConfig};
use crate::module::GatewayModule;

/// Serves `router` on an ephemeral loopback port and returns its base url.
pub(crate) async fn spawn_backend(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Builds the full gateway router for `config`.
pub(crate) fn gateway(config: GatewayConfig) -> Router {
    GatewayModule::new(config).unwrap().build_router()
}

/// `name=url` endpoint pointing at a loopback backend.
pub(crate) fn endpoint(name: &str, url: &Url) -> EndpointSpec {
    EndpointSpec {
        name: name.to_string(),
        url: url.clone(),
    }
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
