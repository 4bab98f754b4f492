//! HTTP/1.1 listener.

use super::admin::AdminApi;
use super::pipeline::RequestPipeline;
use super::request::{ProxyRequest, ProxyResponse};
use crate::modules::deployment::DeploymentManager;
use crate::modules::load_balancer::ServiceRegistry;
use crate::modules::metrics_collector::LoadBalancerMetrics;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Routes inbound requests to metrics, the admin API or the pipeline.
#[derive(Debug)]
pub struct Dispatcher {
    pipeline: RequestPipeline,
    admin: Option<(String, AdminApi)>,
    metrics: Option<MetricsRoute>,
}

#[derive(Debug)]
struct MetricsRoute {
    path: String,
    metrics: Arc<LoadBalancerMetrics>,
    registry: Arc<ServiceRegistry>,
    deployments: Arc<DeploymentManager>,
}

impl Dispatcher {
    /// Dispatch everything to the pipeline.
    #[must_use]
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self {
            pipeline,
            admin: None,
            metrics: None,
        }
    }

    /// Serve the admin API under `prefix`.
    #[must_use]
    pub fn with_admin(mut self, prefix: impl Into<String>, admin: AdminApi) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        self.admin = Some((prefix, admin));
        self
    }

    /// Serve metrics at `path`, refreshing server gauges from `registry`
    /// and the green environments in `deployments`.
    #[must_use]
    pub fn with_metrics(
        mut self,
        path: impl Into<String>,
        metrics: Arc<LoadBalancerMetrics>,
        registry: Arc<ServiceRegistry>,
        deployments: Arc<DeploymentManager>,
    ) -> Self {
        self.metrics = Some(MetricsRoute {
            path: path.into(),
            metrics,
            registry,
            deployments,
        });
        self
    }

    /// The request pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Handle one request.
    pub async fn dispatch(&self, request: ProxyRequest) -> ProxyResponse {
        if let Some(route) = &self.metrics {
            if request.path == route.path {
                return route.scrape();
            }
        }

        if let Some((prefix, admin)) = &self.admin {
            if let Some(rest) = request.path.strip_prefix(prefix.as_str()) {
                if rest.is_empty() || rest.starts_with('/') {
                    return admin.handle(&request.method, rest, &request.body);
                }
            }
        }

        self.pipeline.handle(request).await
    }
}

impl MetricsRoute {
    fn scrape(&self) -> ProxyResponse {
        self.metrics.refresh(&self.registry, &self.deployments);
        match self.metrics.encode() {
            Ok(body) => {
                let mut response = ProxyResponse::new(StatusCode::OK, body);
                response.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
                );
                response
            },
            Err(e) => ProxyResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

async fn handle_request(
    dispatcher: Arc<Dispatcher>,
    request: Request<Incoming>,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(%remote_addr, "Failed to read request body: {e}");
            return Ok(ProxyResponse::text(StatusCode::BAD_REQUEST, "Invalid request body").into_hyper());
        },
    };

    let request = ProxyRequest::from_parts(parts, body, remote_addr, local_addr);
    Ok(dispatcher.dispatch(request).await.into_hyper())
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Each connection is served on its own task; connections already accepted
/// finish independently of shutdown.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "Load balancer listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, remote_addr)) => {
                        debug!(%remote_addr, "New connection");
                        let dispatcher = Arc::clone(&dispatcher);

                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                handle_request(Arc::clone(&dispatcher), req, remote_addr, local_addr)
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!("Connection error: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {e}");
                    }
                }
            }
            () = &mut shutdown => {
                info!("Listener shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::load_balancer::{Algorithm, Server};
    use crate::modules::metrics_collector::MetricsSink;
    use crate::modules::proxy::{HttpForwarder, ProxyConfig};
    use http::Method;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn dispatcher(registry: Arc<ServiceRegistry>) -> Dispatcher {
        let metrics = Arc::new(LoadBalancerMetrics::new());
        let pipeline = RequestPipeline::new(
            ProxyConfig::default(),
            Arc::clone(&registry),
            Arc::new(HttpForwarder::new(Duration::from_secs(5))),
        )
        .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>);
        let deployments = Arc::new(DeploymentManager::new());
        let admin = AdminApi::new(Arc::clone(&registry), Arc::clone(&deployments));

        Dispatcher::new(pipeline)
            .with_admin("/admin", admin)
            .with_metrics("/metrics", metrics, registry, deployments)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_admin_and_metrics() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(
            "orders",
            vec![Arc::new(Server::new("http://a:8080", 1, 100))],
            Algorithm::RoundRobin,
        );
        let dispatcher = dispatcher(registry);

        let services = dispatcher
            .dispatch(ProxyRequest::new(Method::GET, "/admin/services", peer()))
            .await;
        assert_eq!(services.text_body(), r#"["orders"]"#);

        let metrics = dispatcher
            .dispatch(ProxyRequest::new(Method::GET, "/metrics", peer()))
            .await;
        assert_eq!(metrics.status, StatusCode::OK);
        assert!(metrics.text_body().contains("lb_server_healthy"));

        // Not the admin prefix.
        let other = dispatcher
            .dispatch(ProxyRequest::new(Method::GET, "/administrator/x", peer()))
            .await;
        assert_eq!(other.status, StatusCode::NOT_FOUND);
        assert_eq!(other.text_body(), "Unknown service: administrator");
    }

    async fn backend() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]).to_string();
                    let body = head.lines().next().unwrap_or_default().to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_serve_end_to_end() {
        let upstream = backend().await;
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(
            "orders",
            vec![Arc::new(Server::new(format!("http://{upstream}"), 1, 100))],
            Algorithm::RoundRobin,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, Arc::new(dispatcher(registry)), async {
            let _ = rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /orders/api/items?id=7 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("GET /api/items?id=7 HTTP/1.1"));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
