//! The request pipeline: command in, exactly one `Response<T>` out.
//!
//! # Design
//! `ApiRequestHandler` composes the collaborators of a call:
//!
//! ```text
//! send_request_async(command, settings, query, callback)
//!     → UriBuilder (target URI)
//!     → headers: caller headers, then compression negotiation
//!     → body + content type from the command, if any
//!     → TimedExchange (transport vs. deadline)
//!     → ServerTimeTracker (first usable Date header)
//!     → ResponseDecoder (bytes → Response<T>)
//!     → callback, exactly once
//! ```
//!
//! The only synchronous failure is a missing callback. Everything else, URI
//! problems included, reaches the caller through the callback. A body that
//! could not be written ends the call like a timeout does.
//!
//! The handler is cheap to clone; clones share collaborators and the server
//! time tracker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use url::Url;

use crate::command::{Command, ResponseInfo};
use crate::compression::{CompressionHandler, GzipHandler};
use crate::config::{ClientSettings, DEFAULT_REQUEST_TIMEOUT};
use crate::decoder::ResponseDecoder;
use crate::error::{ApiError, TransportError};
use crate::exchange::TimedExchange;
use crate::http::{ReqwestTransport, RequestDescriptor, Transport, TransportResponse};
use crate::response::{json_callback, Response, ResponseCallback};
use crate::server_time::ServerTimeTracker;
use crate::uri::{ApiUriBuilder, UriBuilder};

enum ExchangeOutcome {
    Response(Result<TransportResponse, TransportError>),
    TimedOut,
}

#[derive(Clone)]
pub struct ApiRequestHandler {
    uri_builder: Arc<dyn UriBuilder>,
    compression: Arc<dyn CompressionHandler>,
    transport: Arc<dyn Transport>,
    decoder: ResponseDecoder,
    server_time: Arc<ServerTimeTracker>,
    timeout: Duration,
    runtime: Option<Handle>,
}

impl ApiRequestHandler {
    pub fn new(
        uri_builder: Arc<dyn UriBuilder>,
        compression: Arc<dyn CompressionHandler>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            uri_builder,
            decoder: ResponseDecoder::new(compression.clone()),
            compression,
            transport,
            server_time: Arc::new(ServerTimeTracker::new()),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            runtime: None,
        }
    }

    /// `ApiUriBuilder`, gzip negotiation and a reqwest transport.
    pub fn with_defaults() -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(
            Arc::new(ApiUriBuilder),
            Arc::new(GzipHandler),
            Arc::new(transport),
        ))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_server_time(mut self, tracker: Arc<ServerTimeTracker>) -> Self {
        self.server_time = tracker;
        self
    }

    /// Spawn exchanges on `runtime` instead of the caller's ambient runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn uri_builder(&self) -> &dyn UriBuilder {
        self.uri_builder.as_ref()
    }

    pub fn server_time(&self) -> &Arc<ServerTimeTracker> {
        &self.server_time
    }

    pub fn server_time_utc(&self) -> DateTime<Utc> {
        self.server_time.current_server_time_utc()
    }

    /// Start a call and return immediately.
    ///
    /// `callback` runs exactly once, on a runtime worker, unless this returns
    /// `Err(ApiError::MissingCallback)`.
    pub fn send_request_async<T, C>(
        &self,
        command: &Command,
        settings: &ClientSettings,
        query_params: &[(String, String)],
        callback: Option<C>,
        request_headers: Option<&[(String, String)]>,
    ) -> Result<(), ApiError>
    where
        T: Send + 'static,
        C: ResponseCallback<T>,
    {
        let Some(callback) = callback else {
            return Err(ApiError::MissingCallback);
        };
        let request_id = command.request_id;

        let uri = match self.uri_builder.build_uri(command, settings, query_params) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "could not build request URI");
                callback.callback(Response::failure(None, e, None, request_id));
                return Ok(());
            }
        };
        tracing::debug!(uri = %uri, request_id = %request_id, method = command.method.as_str(), "calling");

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            let error = ApiError::Transport(TransportError::Other("no async runtime available".to_string()));
            deliver(Response::failure(None, error, None, request_id), false, &uri, callback);
            return Ok(());
        };

        let mut request = RequestDescriptor::new(command.method, uri.clone());
        self.add_request_headers(&mut request.headers, request_headers);
        if let Some(body) = command.body.as_deref() {
            request.set_body(body, &command.content_type);
        }
        let has_body = request.body.is_some();
        let exchange = TimedExchange::create(self.transport.clone(), request, self.timeout);

        let handler = self.clone();
        let command = command.clone();
        runtime.spawn(async move {
            let outcome = exchange
                .begin(ExchangeOutcome::Response, || ExchangeOutcome::TimedOut)
                .await;
            let (response, offline) = handler.complete(outcome, has_body, &command, &callback);
            deliver(response, offline, &uri, callback);
        });
        Ok(())
    }

    /// Run a call to completion and parse the body as JSON.
    pub async fn send_request<T>(
        &self,
        command: &Command,
        settings: &ClientSettings,
        query_params: &[(String, String)],
        request_headers: Option<&[(String, String)]>,
    ) -> Response<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let callback = json_callback(move |response: Response<T>| {
            let _ = tx.send(response);
        });
        if let Err(e) = self.send_request_async(command, settings, query_params, Some(callback), request_headers) {
            return Response::failure(None, e, None, command.request_id);
        }
        rx.await
            .unwrap_or_else(|_| Response::failure(None, ApiError::CallFailed, None, command.request_id))
    }

    fn add_request_headers(&self, headers: &mut HeaderMap, request_headers: Option<&[(String, String)]>) {
        for (name, value) in request_headers.unwrap_or_default() {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    tracing::trace!(header = %name, "request header");
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "skipping invalid request header"),
            }
        }
        self.compression.enable_compression(headers);
    }

    fn complete<T, C: ResponseCallback<T>>(
        &self,
        outcome: ExchangeOutcome,
        has_body: bool,
        command: &Command,
        callback: &C,
    ) -> (Response<T>, bool) {
        let request_id = command.request_id;
        let result = match outcome {
            ExchangeOutcome::TimedOut => {
                return (Response::failure(None, ApiError::CallFailed, None, request_id), false);
            }
            ExchangeOutcome::Response(Err(TransportError::BodyWrite(e))) if has_body => {
                tracing::debug!(request_id = %request_id, error = %e, "request body could not be written");
                return (Response::failure(None, ApiError::CallFailed, None, request_id), false);
            }
            ExchangeOutcome::Response(result) => result,
        };

        if let Ok(response) = &result {
            if response.status.is_some() {
                command.set_response_info(ResponseInfo {
                    resolved_uri: response.resolved_uri.clone(),
                    headers: response.headers.clone(),
                });
                self.server_time.update_from_headers(&response.headers);
            }
        }

        let decoded = self
            .decoder
            .decode(result, |raw| callback.convert_from_raw_response(raw));
        let offline = decoded.offline_not_found;
        (decoded.into_response(request_id), offline)
    }
}

/// Log the outcome, then hand it to the callback.
fn deliver<T, C: ResponseCallback<T>>(response: Response<T>, offline: bool, uri: &Url, callback: C) {
    let status = response
        .status_code
        .map_or_else(|| "Timeout".to_string(), |s| s.as_u16().to_string());
    tracing::debug!(uri = %uri, status = %status, request_id = %response.request_id, "response");

    if offline {
        tracing::debug!(uri = %uri, "response synthesized while offline");
    } else if let Some(error) = &response.error {
        tracing::warn!(
            uri = %uri,
            status = %status,
            error_response_body = response.error_response_body.as_deref().unwrap_or_default(),
            error = %error,
            "API call failed"
        );
    }

    callback.callback(response);
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use http::header::{ACCEPT_ENCODING, AGE, CONTENT_TYPE, DATE};
    use http::StatusCode;
    use serde::Deserialize;
    use tokio::sync::mpsc;

    use super::*;
    use crate::compression::NoCompression;
    use crate::http::HttpMethod;
    use crate::response::FnCallback;
    use crate::testing::{json_response as ok_response, ScriptedTransport, RESOLVED};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    fn handler(transport: Arc<ScriptedTransport>) -> ApiRequestHandler {
        ApiRequestHandler::new(Arc::new(ApiUriBuilder), Arc::new(GzipHandler), transport)
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            api_base_uri: "http://localhost:3000/1.x/".to_string(),
            ..ClientSettings::new("test", "gb")
        }
    }

    fn collector<T>() -> (impl ResponseCallback<T>, mpsc::UnboundedReceiver<Response<T>>)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = json_callback(move |r: Response<T>| {
            let _ = tx.send(r);
        });
        (callback, rx)
    }

    async fn single<T>(mut rx: mpsc::UnboundedReceiver<Response<T>>) -> Response<T> {
        let response = rx.recv().await.expect("callback should fire");
        assert!(rx.recv().await.is_none(), "callback fired more than once");
        response
    }

    #[tokio::test]
    async fn missing_callback_fails_before_any_network_activity() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), "{}")));
        let handler = handler(transport.clone());

        type Unused = FnCallback<fn(&str) -> Result<Item, ApiError>, fn(Response<Item>)>;
        let result = handler.send_request_async::<Item, Unused>(&Command::get("search/"), &settings(), &[], None, None);

        assert_eq!(result, Err(ApiError::MissingCallback));
        tokio::task::yield_now().await;
        assert!(transport.seen().is_empty());
    }

    #[tokio::test]
    async fn success_delivers_status_and_result_once() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), r#"{"id":"42"}"#)));
        let handler = handler(transport.clone());
        let command = Command::get("search/");
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&command, &settings(), &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert_eq!(response.status_code, Some(StatusCode::OK));
        assert_eq!(response.result, Some(Item { id: "42".to_string() }));
        assert!(response.error.is_none());
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.request_id, command.request_id);

        let info = command.response_info().expect("response info recorded");
        assert_eq!(info.resolved_uri.as_deref(), Some(RESOLVED));

        let seen = transport.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].uri.as_str(), "http://localhost:3000/1.x/gb/search/?client_id=test");
        assert_eq!(seen[0].headers[ACCEPT_ENCODING], "gzip");
        assert!(seen[0].body.is_none());
    }

    #[tokio::test]
    async fn caller_headers_are_applied_last_write_wins() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), r#"{"id":"1"}"#)));
        let handler = handler(transport.clone());
        let (callback, rx) = collector::<Item>();
        let headers = vec![
            ("X-Device".to_string(), "first".to_string()),
            ("x-device".to_string(), "second".to_string()),
            ("bad header".to_string(), "dropped".to_string()),
        ];

        handler
            .send_request_async(&Command::get("search/"), &settings(), &[], Some(callback), Some(&headers))
            .unwrap();
        single(rx).await;

        let seen = transport.seen();
        let values: Vec<_> = seen[0].headers.get_all("x-device").iter().collect();
        assert_eq!(values, vec!["second"]);
        assert_eq!(seen[0].headers.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_delivers_call_failed_without_status() {
        let transport = ScriptedTransport::delayed(
            Ok(ok_response(StatusCode::OK, Some(RESOLVED), r#"{"id":"late"}"#)),
            Duration::from_secs(120),
        );
        let handler = handler(transport).with_timeout(Duration::from_secs(5));
        let command = Command::get("search/");
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&command, &settings(), &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert!(response.status_code.is_none());
        assert_eq!(response.error, Some(ApiError::CallFailed));
        assert!(response.result.is_none());
        assert_eq!(response.request_id, command.request_id);
        assert!(command.response_info().is_none());
    }

    #[tokio::test]
    async fn body_is_written_with_command_method_and_content_type() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), r#"{"id":"7"}"#)));
        let handler = handler(transport.clone());
        let command = Command::post("ratings/", r#"{"comment":"très bien"}"#.to_string(), "application/json");
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&command, &settings(), &[], Some(callback), None)
            .unwrap();
        assert!(single(rx).await.is_success());

        let seen = transport.seen();
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].headers[CONTENT_TYPE], "application/json");
        assert_eq!(
            seen[0].body.as_deref(),
            Some(r#"{"comment":"très bien"}"#.as_bytes())
        );
    }

    #[tokio::test]
    async fn body_write_failure_takes_the_timeout_path() {
        let transport = ScriptedTransport::new(Err(TransportError::BodyWrite("broken pipe".to_string())));
        let handler = handler(transport);
        let command = Command::post("ratings/", "{}".to_string(), "application/json");
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&command, &settings(), &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert!(response.status_code.is_none());
        assert_eq!(response.error, Some(ApiError::CallFailed));
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error() {
        let transport = ScriptedTransport::new(Err(TransportError::Connect("refused".to_string())));
        let handler = handler(transport);
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&Command::get("search/"), &settings(), &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert!(response.status_code.is_none());
        assert!(matches!(response.error, Some(ApiError::Transport(TransportError::Connect(_)))));
    }

    #[tokio::test]
    async fn not_found_with_resolved_uri_is_an_error() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::NOT_FOUND, Some(RESOLVED), "missing")));
        let handler = handler(transport);
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&Command::get("search/"), &settings(), &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert_eq!(response.status_code, Some(StatusCode::NOT_FOUND));
        assert_eq!(
            response.error,
            Some(ApiError::Status {
                status: StatusCode::NOT_FOUND
            })
        );
        assert_eq!(response.error_response_body.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn not_found_without_resolved_uri_is_transient() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::NOT_FOUND, None, "")));
        let handler = handler(transport);
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&Command::get("search/"), &settings(), &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert_eq!(response.status_code, Some(StatusCode::NOT_FOUND));
        assert!(response.is_transient());
    }

    #[tokio::test]
    async fn uri_failure_reaches_the_callback() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), "{}")));
        let handler = handler(transport.clone());
        let mut bad = settings();
        bad.api_base_uri = "::nope".to_string();
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&Command::get("search/"), &bad, &[], Some(callback), None)
            .unwrap();
        let response = single(rx).await;

        assert!(matches!(response.error, Some(ApiError::InvalidUri(_))));
        assert!(transport.seen().is_empty());
    }

    #[tokio::test]
    async fn server_time_is_captured_from_date_and_age() {
        let server_now = Utc::now() + TimeDelta::hours(1);
        let mut response = ok_response(StatusCode::OK, Some(RESOLVED), r#"{"id":"1"}"#);
        response.headers.insert(
            DATE,
            HeaderValue::from_str(&server_now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).unwrap(),
        );
        response.headers.insert(AGE, HeaderValue::from_static("5"));
        let handler = handler(ScriptedTransport::new(Ok(response)));
        let (callback, rx) = collector::<Item>();

        handler
            .send_request_async(&Command::get("search/"), &settings(), &[], Some(callback), None)
            .unwrap();
        single(rx).await;

        let offset = handler.server_time().offset().expect("offset captured").num_seconds();
        assert!((3603..=3606).contains(&offset), "offset was {offset}");
    }

    #[tokio::test]
    async fn clones_share_the_server_time_tracker() {
        let handler = handler(ScriptedTransport::new(Err(TransportError::Other("unused".to_string()))));
        let clone = handler.clone();
        assert!(Arc::ptr_eq(handler.server_time(), clone.server_time()));

        let independent = clone.with_server_time(Arc::new(ServerTimeTracker::new()));
        assert!(!Arc::ptr_eq(handler.server_time(), independent.server_time()));
    }

    #[tokio::test]
    async fn send_request_awaits_the_single_response() {
        let transport = ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), r#"{"id":"9"}"#)));
        let handler = ApiRequestHandler::new(Arc::new(ApiUriBuilder), Arc::new(NoCompression), transport);

        let response: Response<Item> = handler
            .send_request(&Command::get("search/"), &settings(), &[], None)
            .await;

        assert_eq!(response.result, Some(Item { id: "9".to_string() }));
    }

    #[test]
    fn no_runtime_still_fires_the_callback() {
        let handler = handler(ScriptedTransport::new(Ok(ok_response(StatusCode::OK, Some(RESOLVED), "{}"))));
        let (tx, rx) = std::sync::mpsc::channel();
        let callback = json_callback(move |r: Response<Item>| tx.send(r).unwrap());

        handler
            .send_request_async(&Command::get("search/"), &settings(), &[], Some(callback), None)
            .unwrap();

        let response = rx.recv().unwrap();
        assert!(matches!(response.error, Some(ApiError::Transport(_))));
    }
}
