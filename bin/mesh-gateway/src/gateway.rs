//! Request handling for the gateway's HTTP listener

use crate::router::Router;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{body::Bytes, Method, Request, Response, StatusCode, Uri};
use mesh_core::{ChangeDispatcher, ConfigKey};
use mesh_proxy::http::{bad_gateway_response, error_response, not_found_response};
use mesh_proxy::{DiscoveryInvoker, MetricsCollector, RequestForwarder};
use std::sync::Arc;
use tracing::debug;

pub struct Gateway {
    invoker: DiscoveryInvoker,
    router: Router,
    dispatcher: Arc<ChangeDispatcher>,
    config_key: Option<ConfigKey>,
    metrics: MetricsCollector,
}

impl Gateway {
    pub fn new(
        invoker: DiscoveryInvoker,
        router: Router,
        dispatcher: Arc<ChangeDispatcher>,
        config_key: Option<ConfigKey>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            invoker,
            router,
            dispatcher,
            config_key,
            metrics,
        }
    }

    /// Serve one fully-read request
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        debug!("{} {}", method, path);

        let (route, response) = match (&method, path.as_str()) {
            (&Method::GET, "/health") => ("/health".to_string(), text(StatusCode::OK, "OK\n".to_string())),
            (&Method::GET, "/metrics") => ("/metrics".to_string(), self.metrics_response()),
            (&Method::GET, "/config") => ("/config".to_string(), self.config_response().await),
            _ => self.forward(request).await,
        };

        self.metrics.record_request(&route, response.status().as_u16());
        response
    }

    fn metrics_response(&self) -> Response<Bytes> {
        let body = self
            .metrics
            .gather()
            .unwrap_or_else(|_| "Failed to gather metrics\n".to_string());
        let mut response = text(StatusCode::OK, body);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
        response
    }

    async fn config_response(&self) -> Response<Bytes> {
        let Some(key) = &self.config_key else {
            return not_found_response("no config key watched");
        };
        match self.dispatcher.current(key).await {
            Some(content) => text(StatusCode::OK, content),
            None => not_found_response(&format!("no change observed yet for {}", key)),
        }
    }

    async fn forward(&self, request: Request<Bytes>) -> (String, Response<Bytes>) {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let Some(matched) = self.router.route(&path_and_query) else {
            return ("unmatched".to_string(), not_found_response(request.uri().path()));
        };
        let label = matched.route.prefix.clone();

        let uri: Uri = match matched.forward_path.parse() {
            Ok(uri) => uri,
            Err(e) => return (label, bad_gateway_response(&e.to_string())),
        };
        let (mut parts, body) = request.into_parts();
        parts.uri = uri;

        let response = match self
            .invoker
            .invoke(&matched.route.service, &matched.route.group, Request::from_parts(parts, body))
            .await
        {
            Ok(mut response) => {
                // Body is re-framed by our own connection
                let headers = RequestForwarder::forwardable_headers(response.headers());
                *response.headers_mut() = headers;
                response
            }
            Err(e) => error_response(&e),
        };
        (label, response)
    }
}

fn text(status: StatusCode, body: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response
}
