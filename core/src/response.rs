//! The uniform outcome of a call and the callbacks that receive it.
//!
//! # Design
//! Every call ends in exactly one `Response<T>`. On success `result` is set
//! and `error` is empty; on failure `error` is set and `error_response_body`
//! keeps whatever the server sent. The single exception is a platform
//! "fake not-found", which carries neither: callers should treat
//! "no result, no error" as transient rather than as an API failure.

use http::StatusCode;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug)]
pub struct Response<T> {
    /// Absent on transport failure and timeout.
    pub status_code: Option<StatusCode>,
    pub content_type: Option<String>,
    pub result: Option<T>,
    pub error: Option<ApiError>,
    /// Raw body of a failed response, for diagnostics.
    pub error_response_body: Option<String>,
    /// Correlates the response with the command that produced it.
    pub request_id: Uuid,
}

impl<T> Response<T> {
    pub fn success(status_code: Option<StatusCode>, content_type: Option<String>, result: T, request_id: Uuid) -> Self {
        Self {
            status_code,
            content_type,
            result: Some(result),
            error: None,
            error_response_body: None,
            request_id,
        }
    }

    pub fn failure(
        status_code: Option<StatusCode>,
        error: ApiError,
        error_response_body: Option<String>,
        request_id: Uuid,
    ) -> Self {
        Self {
            status_code,
            content_type: None,
            result: None,
            error: Some(error),
            error_response_body,
            request_id,
        }
    }

    /// A response the platform synthesized while offline.
    pub fn offline_not_found(status_code: Option<StatusCode>, request_id: Uuid) -> Self {
        Self {
            status_code,
            content_type: None,
            result: None,
            error: None,
            error_response_body: None,
            request_id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Neither a result nor an error: nothing actually reached the server.
    pub fn is_transient(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            status_code: self.status_code,
            content_type: self.content_type,
            result: self.result.map(f),
            error: self.error,
            error_response_body: self.error_response_body,
            request_id: self.request_id,
        }
    }
}

/// Receives the outcome of one call.
pub trait ResponseCallback<T>: Send + 'static {
    /// Turn the decoded response text into `T`.
    fn convert_from_raw_response(&self, raw: &str) -> Result<T, ApiError>;

    /// Deliver the terminal response. Called exactly once per call.
    fn callback(self, response: Response<T>);
}

/// `ResponseCallback` assembled from a parser and a completion closure.
pub struct FnCallback<P, F> {
    parser: P,
    on_response: F,
}

impl<P, F> FnCallback<P, F> {
    pub fn new(parser: P, on_response: F) -> Self {
        Self { parser, on_response }
    }
}

impl<T, P, F> ResponseCallback<T> for FnCallback<P, F>
where
    P: Fn(&str) -> Result<T, ApiError> + Send + 'static,
    F: FnOnce(Response<T>) + Send + 'static,
{
    fn convert_from_raw_response(&self, raw: &str) -> Result<T, ApiError> {
        (self.parser)(raw)
    }

    fn callback(self, response: Response<T>) {
        (self.on_response)(response)
    }
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ApiError> {
    Ok(serde_json::from_str(raw)?)
}

/// Callback that parses the body as JSON into `T`.
pub fn json_callback<T, F>(on_response: F) -> FnCallback<fn(&str) -> Result<T, ApiError>, F>
where
    T: DeserializeOwned,
    F: FnOnce(Response<T>) + Send + 'static,
{
    FnCallback::new(parse_json::<T> as fn(&str) -> Result<T, ApiError>, on_response)
}
