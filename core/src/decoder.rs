//! Turning a transport response into a typed result.
//!
//! # Design
//! Decoding never fails outright; every problem is captured in `Decoded` so
//! the request handler can always produce exactly one `Response<T>`.
//!
//! Some platform networking stacks answer a request made while offline with a
//! synthetic 404 whose final URI is empty, without ever contacting the
//! server. `is_offline_not_found` recognizes that shape; such responses carry
//! neither a result nor an error.

use std::sync::Arc;

use http::StatusCode;
use uuid::Uuid;

use crate::compression::CompressionHandler;
use crate::error::{ApiError, TransportError};
use crate::http::TransportResponse;
use crate::response::Response;

/// Everything learned from one response, before it is shaped for the caller.
#[derive(Debug)]
pub struct Decoded<T> {
    pub status_code: Option<StatusCode>,
    pub content_type: Option<String>,
    pub result: Option<T>,
    pub error: Option<ApiError>,
    pub raw_body: Option<String>,
    pub offline_not_found: bool,
}

impl<T> Decoded<T> {
    fn transport_failure(error: TransportError) -> Self {
        Self {
            status_code: None,
            content_type: None,
            result: None,
            error: Some(ApiError::Transport(error)),
            raw_body: None,
            offline_not_found: false,
        }
    }

    pub fn into_response(self, request_id: Uuid) -> Response<T> {
        match (self.result, self.offline_not_found) {
            (Some(result), false) => Response::success(self.status_code, self.content_type, result, request_id),
            (_, true) => Response::offline_not_found(self.status_code, request_id),
            (None, false) => Response::failure(
                self.status_code,
                self.error.unwrap_or(ApiError::CallFailed),
                self.raw_body,
                request_id,
            ),
        }
    }
}

/// True for a response the platform produced without dispatching the request.
pub fn is_offline_not_found(response: &TransportResponse) -> bool {
    response.resolved_uri.as_deref().map_or(true, str::is_empty)
}

#[derive(Clone)]
pub struct ResponseDecoder {
    compression: Arc<dyn CompressionHandler>,
}

impl ResponseDecoder {
    pub fn new(compression: Arc<dyn CompressionHandler>) -> Self {
        Self { compression }
    }

    pub fn decode<T>(
        &self,
        response: Result<TransportResponse, TransportError>,
        convert: impl FnOnce(&str) -> Result<T, ApiError>,
    ) -> Decoded<T> {
        let response = match response {
            Ok(r) => r,
            Err(e) => return Decoded::transport_failure(e),
        };

        let mut decoded = Decoded {
            status_code: response.status,
            content_type: response.content_type(),
            result: None,
            error: None,
            raw_body: None,
            offline_not_found: is_offline_not_found(&response),
        };

        let text = match self.read_text(&response) {
            Ok(text) => text,
            Err(e) => {
                decoded.error = Some(e);
                return decoded;
            }
        };

        match response.status {
            Some(status) if !status.is_success() => {
                decoded.error = Some(ApiError::Status { status });
            }
            _ => match convert(&text) {
                Ok(value) => decoded.result = Some(value),
                Err(e) => decoded.error = Some(e),
            },
        }
        decoded.raw_body = Some(text);
        decoded
    }

    fn read_text(&self, response: &TransportResponse) -> Result<String, ApiError> {
        if let Some(e) = &response.body_error {
            return Err(ApiError::Body(e.clone()));
        }
        let bytes = self.compression.decoded_body(response)?;
        String::from_utf8(bytes).map_err(|e| ApiError::Body(e.to_string()))
    }
}
