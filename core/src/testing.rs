//! Shared fakes for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::error::TransportError;
use crate::http::{RequestDescriptor, Transport, TransportResponse};

pub const RESOLVED: &str = "http://localhost:3000/1.x/gb/search/";

/// Replays canned replies in order, optionally after a delay, and records
/// every request it sees.
pub struct ScriptedTransport {
    replies: Mutex<Vec<Result<TransportResponse, TransportError>>>,
    delay: Duration,
    seen: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
    pub fn new(reply: Result<TransportResponse, TransportError>) -> Arc<Self> {
        Self::delayed(reply, Duration::ZERO)
    }

    pub fn delayed(reply: Result<TransportResponse, TransportError>, delay: Duration) -> Arc<Self> {
        Self::sequence(vec![reply], delay)
    }

    pub fn sequence(replies: Vec<Result<TransportResponse, TransportError>>, delay: Duration) -> Arc<Self> {
        let mut replies = replies;
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<RequestDescriptor> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.seen.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply.unwrap_or_else(|| Err(TransportError::Other("no scripted reply".to_string())))
    }
}

pub fn json_response(status: StatusCode, resolved_uri: Option<&str>, body: &str) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    TransportResponse {
        status: Some(status),
        resolved_uri: resolved_uri.map(str::to_string),
        headers,
        body: Bytes::copy_from_slice(body.as_bytes()),
        body_error: None,
    }
}
