//! Commands: plain descriptions of a single API call.
//!
//! # Design
//! A `Command` carries everything the request handler needs to shape a call
//! (method, endpoint, body, content type) as data. Bodies are produced by pure
//! constructors such as `post_json` and `post_form`, so the handler never has
//! to ask the command to compute anything.
//!
//! After the response arrives the handler records the final URI and response
//! headers in the command's `ResponseInfo` slot. One command describes one
//! call: the slot is write-once and clones share it.

use std::sync::{Arc, OnceLock};

use http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::HttpMethod;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Metadata about a completed response.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub resolved_uri: Option<String>,
    pub headers: HeaderMap,
}

/// One API operation.
#[derive(Debug, Clone)]
pub struct Command {
    pub method: HttpMethod,
    /// Endpoint path relative to the base URI, e.g. `"search/"`.
    pub path: String,
    pub content_type: String,
    pub request_id: Uuid,
    pub body: Option<String>,
    /// Prefix the path with the configured country code.
    pub requires_country: bool,
    /// Send to the secure base URI instead of the plain one.
    pub secure: bool,
    response_info: Arc<OnceLock<ResponseInfo>>,
}

impl Command {
    fn new(method: HttpMethod, path: &str, body: Option<String>, content_type: &str) -> Self {
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            content_type: content_type.to_string(),
            request_id: Uuid::new_v4(),
            body,
            requires_country: true,
            secure: false,
            response_info: Arc::new(OnceLock::new()),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(HttpMethod::Get, path, None, JSON_CONTENT_TYPE)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(HttpMethod::Delete, path, None, JSON_CONTENT_TYPE)
    }

    /// POST a raw body with an explicit content type.
    pub fn post(path: &str, body: String, content_type: &str) -> Self {
        Self::new(HttpMethod::Post, path, Some(body), content_type)
    }

    pub fn post_json<B: Serialize>(path: &str, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::InvalidArgument(e.to_string()))?;
        Ok(Self::new(HttpMethod::Post, path, Some(body), JSON_CONTENT_TYPE))
    }

    pub fn put_json<B: Serialize>(path: &str, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::InvalidArgument(e.to_string()))?;
        Ok(Self::new(HttpMethod::Put, path, Some(body), JSON_CONTENT_TYPE))
    }

    /// POST `application/x-www-form-urlencoded` pairs.
    pub fn post_form(path: &str, fields: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        Self::new(HttpMethod::Post, path, Some(body), FORM_CONTENT_TYPE)
    }

    pub fn without_country(mut self) -> Self {
        self.requires_country = false;
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Record response metadata. Only the first call has an effect.
    pub fn set_response_info(&self, info: ResponseInfo) {
        let _ = self.response_info.set(info);
    }

    pub fn response_info(&self) -> Option<&ResponseInfo> {
        self.response_info.get()
    }
}
