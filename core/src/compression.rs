//! Response compression negotiation and decoding.

use std::io::Read;

use flate2::read::GzDecoder;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use http::{HeaderMap, HeaderValue};

use crate::error::ApiError;
use crate::http::TransportResponse;

/// Negotiates compression on requests and undoes it on responses.
pub trait CompressionHandler: Send + Sync + 'static {
    fn enable_compression(&self, headers: &mut HeaderMap);

    /// Return the body with any content encoding removed.
    fn decoded_body(&self, response: &TransportResponse) -> Result<Vec<u8>, ApiError>;
}

/// Requests gzip and inflates gzip-encoded bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipHandler;

impl CompressionHandler for GzipHandler {
    fn enable_compression(&self, headers: &mut HeaderMap) {
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    }

    fn decoded_body(&self, response: &TransportResponse) -> Result<Vec<u8>, ApiError> {
        if !is_gzip(&response.headers) {
            return Ok(response.body.to_vec());
        }
        let mut decoded = Vec::new();
        GzDecoder::new(response.body.as_ref())
            .read_to_end(&mut decoded)
            .map_err(|e| ApiError::Body(e.to_string()))?;
        Ok(decoded)
    }
}

/// Leaves requests and bodies untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl CompressionHandler for NoCompression {
    fn enable_compression(&self, _headers: &mut HeaderMap) {}

    fn decoded_body(&self, response: &TransportResponse) -> Result<Vec<u8>, ApiError> {
        Ok(response.body.to_vec())
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
}
