use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, TextEncoder};
use rustls::ServerConfig;

use crate::accounting::ByteCounterRegistry;

async fn metrics(counters: State<Arc<ByteCounterRegistry>>) -> Response {
    let encoder = TextEncoder::new();
    let families = counters.registry().gather();
    let mut body = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut body) {
        log::error!("failed to encode metrics: {}", err);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
        body,
    )
        .into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Serves `/metrics` (Prometheus text format) and `/healthz`.
pub struct MetricsServer {
    router: axum::Router,
}

impl MetricsServer {
    pub fn new(counters: Arc<ByteCounterRegistry>) -> Self {
        let router = axum::Router::new()
            .route("/metrics", get(metrics))
            .route("/healthz", get(healthz))
            .with_state(counters);
        Self { router }
    }

    /// Listens on `addr` until the server fails, over TLS when `tls` is set.
    ///
    /// # Errors
    ///
    /// Returns the I/O error that stopped the server, e.g. a failed bind.
    pub async fn serve(self, addr: SocketAddr, tls: Option<Arc<ServerConfig>>) -> std::io::Result<()> {
        match tls {
            Some(config) => {
                log::info!("serving metrics over https: addr={}", addr);
                let config = axum_server::tls_rustls::RustlsConfig::from_config(config);
                axum_server::bind_rustls(addr, config)
                    .serve(self.router.into_make_service())
                    .await
            }
            None => {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                log::info!("serving metrics over http: addr={}", listener.local_addr()?);
                axum::serve(listener, self.router.into_make_service()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::identity::WorkloadIdentity;

    const UID: &str = "0123456789abcdef0123456789abcdef";

    async fn get_body(server: MetricsServer, uri: &str) -> (StatusCode, String) {
        let response = server
            .router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_exposes_counter() {
        let counters = Arc::new(ByteCounterRegistry::new().unwrap());
        counters.update(&WorkloadIdentity::new("ns", "pod", UID, "app", 0), 16);

        let (status, body) = get_body(MetricsServer::new(Arc::clone(&counters)), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE log_logged_bytes_total counter"));
        assert!(body.contains(&format!(
            "log_logged_bytes_total{{containername=\"app\",namespace=\"ns\",podname=\"pod\",poduuid=\"{UID}\"}} 16"
        )));
    }

    #[tokio::test]
    async fn test_forgotten_series_disappears() {
        let counters = Arc::new(ByteCounterRegistry::new().unwrap());
        let id = WorkloadIdentity::new("ns", "pod", UID, "app", 0);
        counters.update(&id, 16);
        counters.forget(&id);

        let (_, body) = get_body(MetricsServer::new(counters), "/metrics").await;
        assert!(!body.contains("podname=\"pod\""));
    }

    #[tokio::test]
    async fn test_healthz() {
        let counters = Arc::new(ByteCounterRegistry::new().unwrap());
        let (status, body) = get_body(MetricsServer::new(counters), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
