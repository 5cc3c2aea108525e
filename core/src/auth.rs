//! OAuth authorization-code flow for user-scoped calls.
//!
//! # Design
//! The browser leg lives in the host: it opens `construct_authorize_uri`,
//! waits for the redirect, and hands the outcome back as a `BrokerResult`.
//! From there the flow parses the redirect, exchanges the code for a token
//! over the secure API and keeps the last `TokenResponse`.
//!
//! ```text
//! host browser ──▶ BrokerResult ──▶ convert_broker_result
//!                                      ├─ parse_completed_flags (code / error)
//!                                      └─ obtain_token ──▶ POST {secure}token/
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use http::StatusCode;
use url::{form_urlencoded, Url};
use uuid::Uuid;

use crate::command::Command;
use crate::config::ClientSettings;
use crate::error::ApiError;
use crate::handler::ApiRequestHandler;
use crate::response::Response;
use crate::types::TokenResponse;

/// Permissions a user can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    ReadUserPlayHistory,
    ReceiveNotifications,
    ReadTasteProfile,
}

impl Scope {
    pub const ALL: [Scope; 3] = [
        Scope::ReadUserPlayHistory,
        Scope::ReceiveNotifications,
        Scope::ReadTasteProfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::ReadUserPlayHistory => "read_userplayhistory",
            Scope::ReceiveNotifications => "receive_notifications",
            Scope::ReadTasteProfile => "read_taste_profile",
        }
    }
}

/// `+`-joined scope names, duplicates removed.
pub fn scope_param(scopes: &[Scope]) -> String {
    let mut seen: Vec<Scope> = Vec::with_capacity(scopes.len());
    for scope in scopes {
        if !seen.contains(scope) {
            seen.push(*scope);
        }
    }
    seen.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("+")
}

/// Page the user's browser is sent to in order to grant `scopes`.
pub fn authorize_uri(secure_api_base_uri: &str, client_id: &str, scopes: &[Scope]) -> Result<Url, ApiError> {
    let base = secure_api_base_uri.trim_end_matches('/');
    let client_id: String = form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
    let uri = format!(
        "{base}/authorize/?response_type=code&client_id={client_id}&scope={}",
        scope_param(scopes)
    );
    Ok(Url::parse(&uri)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthResultCode {
    #[default]
    Unknown,
    Success,
    Cancelled,
    AccessDenied,
    InvalidScope,
    UnauthorizedClient,
    ServerError,
}

impl AuthResultCode {
    fn from_error_param(value: &str) -> Self {
        match value {
            "access_denied" => AuthResultCode::AccessDenied,
            "invalid_scope" => AuthResultCode::InvalidScope,
            "unauthorized_client" => AuthResultCode::UnauthorizedClient,
            "server_error" => AuthResultCode::ServerError,
            _ => AuthResultCode::Unknown,
        }
    }
}

/// What the host's browser leg produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerResult {
    /// The final redirect URI, or just its query string.
    Success(String),
    ErrorHttp(u16),
    Cancelled,
}

/// Read `code=` or `error=` from a completed redirect.
///
/// Returns `None` when the redirect carries neither.
pub fn parse_completed_flags(response_data: &str) -> Option<(AuthResultCode, Option<String>)> {
    let query = response_data
        .split_once('?')
        .map_or(response_data, |(_, q)| q);
    let query = query.split('#').next().unwrap_or_default();

    let mut error = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" if !value.is_empty() => return Some((AuthResultCode::Success, Some(value.into_owned()))),
            "error" => error = Some(AuthResultCode::from_error_param(&value)),
            _ => {}
        }
    }
    error.map(|code| (code, None))
}

fn code_only(code: AuthResultCode) -> Response<AuthResultCode> {
    Response::success(None, None, code, Uuid::nil())
}

/// Clears the in-progress flag however the token call ends.
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct OAuthUserFlow {
    settings: ClientSettings,
    handler: ApiRequestHandler,
    token_call_in_progress: AtomicBool,
    token_response: Mutex<Option<TokenResponse>>,
}

impl OAuthUserFlow {
    pub fn new(settings: ClientSettings, handler: ApiRequestHandler) -> Self {
        Self {
            settings,
            handler,
            token_call_in_progress: AtomicBool::new(false),
            token_response: Mutex::new(None),
        }
    }

    pub fn construct_authorize_uri(&self, scopes: &[Scope]) -> Result<Url, ApiError> {
        authorize_uri(&self.settings.secure_api_base_uri, &self.settings.client_id, scopes)
    }

    /// Map the host's browser outcome to a result code, exchanging the
    /// authorization code for a token when there is one.
    pub async fn convert_broker_result(&self, result: BrokerResult) -> Response<AuthResultCode> {
        match result {
            BrokerResult::Success(data) => match parse_completed_flags(&data) {
                Some((code, authorization_code)) => self.obtain_token(authorization_code.as_deref(), None, code).await,
                None => code_only(AuthResultCode::Unknown),
            },
            BrokerResult::ErrorHttp(status) => match StatusCode::from_u16(status) {
                Ok(StatusCode::BAD_REQUEST) => code_only(AuthResultCode::InvalidScope),
                Ok(StatusCode::UNAUTHORIZED) => code_only(AuthResultCode::UnauthorizedClient),
                Ok(StatusCode::INTERNAL_SERVER_ERROR) => code_only(AuthResultCode::ServerError),
                _ => code_only(AuthResultCode::Cancelled),
            },
            BrokerResult::Cancelled => code_only(AuthResultCode::Cancelled),
        }
    }

    /// Exchange an authorization code or refresh token for an access token.
    ///
    /// Without either, `result_code` is returned unchanged.
    pub async fn obtain_token(
        &self,
        authorization_code: Option<&str>,
        refresh_token: Option<&str>,
        result_code: AuthResultCode,
    ) -> Response<AuthResultCode> {
        let command = match (
            authorization_code.filter(|c| !c.is_empty()),
            refresh_token.filter(|t| !t.is_empty()),
        ) {
            (Some(code), _) => self.token_command(&[("grant_type", "authorization_code"), ("code", code)]),
            (None, Some(token)) => self.token_command(&[("grant_type", "refresh_token"), ("refresh_token", token)]),
            (None, None) => return code_only(result_code),
        };

        let _guard = InProgress::start(&self.token_call_in_progress);
        let response: Response<TokenResponse> = self.handler.send_request(&command, &self.settings, &[], None).await;

        let Response {
            status_code,
            result,
            error,
            error_response_body,
            request_id,
            ..
        } = response;
        match result {
            Some(token) => {
                tracing::debug!(request_id = %request_id, expires_in = token.expires_in, "obtained access token");
                *self.token_slot() = Some(token);
                Response::success(status_code, None, AuthResultCode::Success, request_id)
            }
            None => Response::failure(
                status_code,
                error.unwrap_or(ApiError::CallFailed),
                error_response_body,
                request_id,
            ),
        }
    }

    pub fn token_call_in_progress(&self) -> bool {
        self.token_call_in_progress.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.token_call_in_progress()
    }

    pub fn token_response(&self) -> Option<TokenResponse> {
        self.token_slot().clone()
    }

    fn token_slot(&self) -> std::sync::MutexGuard<'_, Option<TokenResponse>> {
        self.token_response.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token_command(&self, grant: &[(&str, &str)]) -> Command {
        let mut fields = grant.to_vec();
        fields.push(("client_id", self.settings.client_id.as_str()));
        if let Some(secret) = self.settings.client_secret.as_deref() {
            fields.push(("client_secret", secret));
        }
        Command::post_form("token/", &fields).without_country().secure()
    }
}
