//! HTTP request forwarding to a resolved instance

use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HOST};
use hyper::{body::Bytes, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use mesh_core::{MeshError, Result};
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

/// HTTP request forwarder with connection pooling and a bounded request time
pub struct RequestForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl RequestForwarder {
    /// Create a forwarder whose requests (connect, send, read body) are
    /// bounded by `timeout`
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_keepalive(Some(Duration::from_secs(30)));

        let client = Client::builder(TokioExecutor::new()).build::<_, Full<Bytes>>(connector);

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` to `target_url`, keeping method, headers and body
    ///
    /// The upstream response is returned as received. Transport failures and
    /// timeouts become `UpstreamUnavailable`.
    pub async fn forward(&self, target_url: &str, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let uri: Uri = target_url
            .parse()
            .map_err(|e| MeshError::UpstreamUnavailable(format!("invalid url {}: {}", target_url, e)))?;

        let (mut parts, body) = request.into_parts();
        parts.headers = Self::forwardable_headers(&parts.headers);
        parts.uri = uri;

        debug!(
            "Forwarding {} {} ({} headers, {} bytes)",
            parts.method,
            target_url,
            parts.headers.len(),
            body.len()
        );

        let outbound = Request::from_parts(parts, Full::new(body));

        let exchange = async {
            let response = self.client.request(outbound).await?;
            let (parts, body) = response.into_parts();
            let bytes = body.collect().await?.to_bytes();
            anyhow::Ok(Response::from_parts(parts, bytes))
        };

        match tokio_timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => {
                debug!(
                    "Upstream {} answered {} ({} bytes)",
                    target_url,
                    response.status(),
                    response.body().len()
                );
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!("Upstream request to {} failed: {}", target_url, e);
                Err(MeshError::UpstreamUnavailable(format!("{}: {}", target_url, e)))
            }
            Err(_) => {
                warn!("Upstream request to {} timed out after {:?}", target_url, self.timeout);
                Err(MeshError::UpstreamUnavailable(format!(
                    "{}: timed out after {:?}",
                    target_url, self.timeout
                )))
            }
        }
    }

    /// Copy of `headers` without connection-scoped entries
    ///
    /// `host` is dropped so the client derives it from the target address.
    pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
        let mut filtered = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers.iter() {
            if *name == HOST || Self::is_hop_by_hop_header(name.as_str()) {
                continue;
            }
            filtered.append(name.clone(), value.clone());
        }
        filtered
    }

    /// Check if header is hop-by-hop (should not be forwarded)
    pub fn is_hop_by_hop_header(name: &str) -> bool {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "connection"
                | "keep-alive"
                | "proxy-authenticate"
                | "proxy-authorization"
                | "te"
                | "trailers"
                | "transfer-encoding"
                | "upgrade"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_forwarder_creation_with_different_timeouts() {
        let forwarder_5s = RequestForwarder::new(Duration::from_secs(5));
        assert_eq!(forwarder_5s.timeout(), Duration::from_secs(5));

        let forwarder_60s = RequestForwarder::new(Duration::from_secs(60));
        assert_eq!(forwarder_60s.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(RequestForwarder::is_hop_by_hop_header("connection"));
        assert!(RequestForwarder::is_hop_by_hop_header("Keep-Alive"));
        assert!(RequestForwarder::is_hop_by_hop_header("transfer-encoding"));
        assert!(!RequestForwarder::is_hop_by_hop_header("content-type"));
        assert!(!RequestForwarder::is_hop_by_hop_header("authorization"));
    }

    #[test]
    fn test_forwardable_headers_keep_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("gateway:8080"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));

        let filtered = RequestForwarder::forwardable_headers(&headers);
        assert!(filtered.get(HOST).is_none());
        assert!(filtered.get("connection").is_none());
        assert_eq!(filtered.get_all("x-tag").iter().count(), 2);
        assert_eq!(filtered.get("authorization").unwrap(), "Bearer t");
    }

    #[tokio::test]
    async fn test_invalid_url_is_upstream_unavailable() {
        let forwarder = RequestForwarder::new(Duration::from_secs(1));
        let request = Request::new(Bytes::new());
        let result = forwarder.forward("http://bad host:80/", request).await;
        assert!(matches!(result, Err(MeshError::UpstreamUnavailable(_))));
    }
}
