//! Asynchronous client core for the music catalog API.
//!
//! # Overview
//! Every call flows through one pipeline: a `Command` describes the request,
//! `ApiRequestHandler` builds the URI and headers, races the transport
//! against a deadline, records server clock skew, decodes the body and
//! delivers exactly one `Response<T>` to the caller's callback.
//!
//! # Design
//! - The network sits behind the `Transport` trait; `ReqwestTransport` is the
//!   default and tests substitute scripted fakes.
//! - URI layout and compression are pluggable (`UriBuilder`,
//!   `CompressionHandler`) so hosts can adapt them without touching the
//!   pipeline.
//! - `MusicClient` and `OAuthUserFlow` are thin typed layers over the handler.
//! - Deep-link `tasks` are pure URI builders plus a host-supplied `Launcher`.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod command;
pub mod compression;
pub mod config;
pub mod decoder;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod http;
pub mod response;
pub mod server_time;
pub mod tasks;
pub mod types;
pub mod uri;

#[cfg(test)]
mod testing;

pub use auth::{AuthResultCode, BrokerResult, OAuthUserFlow, Scope};
pub use client::MusicClient;
pub use command::Command;
pub use compression::{CompressionHandler, GzipHandler, NoCompression};
pub use config::{load_settings, validate_settings, ClientSettings};
pub use decoder::ResponseDecoder;
pub use error::{ApiError, ConfigError, LaunchError, TaskError, TransportError};
pub use exchange::{CompletionToken, TimedExchange};
pub use handler::ApiRequestHandler;
pub use http::{HttpMethod, ReqwestTransport, RequestDescriptor, Transport, TransportResponse};
pub use response::{json_callback, FnCallback, Response, ResponseCallback};
pub use server_time::ServerTimeTracker;
pub use tasks::{DeepLinkTask, LaunchTarget, LaunchUris, Launcher};
pub use types::{Artist, Category, ListPage, Product, TokenResponse};
pub use uri::{ApiUriBuilder, UriBuilder};
