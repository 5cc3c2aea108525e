//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are described as plain data. `RequestDescriptor` is
//! built once per call by the request handler and moved into the exchange;
//! `TransportResponse` is what a transport hands back once the server has
//! answered. The network itself sits behind the `Transport` trait so the
//! pipeline can be driven by `reqwest` in production and by scripted
//! transports in tests.
//!
//! A transport reports an HTTP error status as a normal `TransportResponse`.
//! Only failures that produced no response at all become a `TransportError`.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use url::Url;

use crate::error::TransportError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// The resolved outbound request for one exchange.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub uri: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, uri: Url) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Attach a UTF-8 body and its content type.
    ///
    /// An unrepresentable content type is left off rather than failing the
    /// request; the server then falls back to its own default.
    pub fn set_body(&mut self, body: &str, content_type: &str) {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        } else {
            tracing::warn!(content_type, "ignoring invalid content type");
        }
        self.body = Some(Bytes::copy_from_slice(body.as_bytes()));
    }
}

/// A response as delivered by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// `None` when the transport produced a response that is not HTTP-shaped.
    pub status: Option<StatusCode>,
    /// Final URI after redirects. Absent or empty when the platform
    /// synthesized the response without dispatching the request.
    pub resolved_uri: Option<String>,
    pub headers: HeaderMap,
    /// Raw body bytes, still content-encoded.
    pub body: Bytes,
    /// Set when the status and headers arrived but reading the body failed.
    pub body_error: Option<String>,
}

impl TransportResponse {
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Executes one HTTP exchange.
///
/// Implementations must not retry and must not decompress the body; both
/// belong to the layers above.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
///
/// The client is built without reqwest's transparent decompression so the
/// compression handler sees the bytes exactly as they came off the wire.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportError> {
        let has_body = request.body.is_some();
        let mut builder = self
            .client
            .request(request.method.into(), request.uri)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| send_error(e, has_body))?;
        let status = response.status();
        let resolved_uri = Some(response.url().to_string());
        let headers = response.headers().clone();
        let (body, body_error) = match response.bytes().await {
            Ok(body) => (body, None),
            Err(e) => {
                tracing::debug!(%status, error = %e, "response body truncated");
                (Bytes::new(), Some(e.to_string()))
            }
        };

        Ok(TransportResponse {
            status: Some(status),
            resolved_uri,
            headers,
            body,
            body_error,
        })
    }
}

/// Classify a failure that happened before any response head arrived.
///
/// Once connected, a request carrying a body can only fail while it is
/// being written, so those failures are body-write failures.
fn send_error(err: reqwest::Error, has_body: bool) -> TransportError {
    if has_body && !err.is_connect() && !err.is_timeout() && (err.is_request() || err.is_body() || is_broken_pipe(&err)) {
        return TransportError::BodyWrite(err.to_string());
    }
    TransportError::from(err)
}

fn is_broken_pipe(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> Url {
        Url::parse("http://localhost:3000/1.x/gb/search/").unwrap()
    }

    #[test]
    fn new_descriptor_has_no_body_or_headers() {
        let req = RequestDescriptor::new(HttpMethod::Get, uri());
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn set_body_writes_utf8_and_content_type() {
        let mut req = RequestDescriptor::new(HttpMethod::Post, uri());
        req.set_body("naïve", "application/json");
        assert_eq!(req.body.as_deref(), Some("naïve".as_bytes()));
        assert_eq!(req.headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn set_body_skips_invalid_content_type() {
        let mut req = RequestDescriptor::new(HttpMethod::Post, uri());
        req.set_body("{}", "bad\nvalue");
        assert!(req.headers.get(CONTENT_TYPE).is_none());
        assert!(req.body.is_some());
    }

    #[test]
    fn method_maps_to_http_method() {
        assert_eq!(Method::from(HttpMethod::Put), Method::PUT);
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }

    #[test]
    fn content_type_is_read_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let resp = TransportResponse {
            status: Some(StatusCode::OK),
            resolved_uri: None,
            headers,
            body: Bytes::new(),
            body_error: None,
        };
        assert_eq!(resp.content_type().as_deref(), Some("application/json"));
    }
}
