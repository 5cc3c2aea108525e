//! Typed catalog client over the request pipeline.
//!
//! # Design
//! `MusicClient` turns catalog operations into `Command`s plus query
//! parameters and hands them to an `ApiRequestHandler`. Each operation comes
//! in two shapes: a callback form that returns as soon as the call is started,
//! and an `async` twin that resolves to the same `Response`. Argument checks
//! run before anything is sent; the callback form reports them synchronously.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::command::Command;
use crate::config::ClientSettings;
use crate::error::ApiError;
use crate::handler::ApiRequestHandler;
use crate::response::{json_callback, Response};
use crate::types::{Artist, Category, ListPage, Product};

pub const DEFAULT_START_INDEX: usize = 0;
pub const DEFAULT_ITEMS_PER_PAGE: usize = 10;

/// A command together with the query parameters it is sent with.
struct Prepared {
    command: Command,
    query: Vec<(String, String)>,
}

/// An argument check failed for the command with this request id.
struct Rejected {
    request_id: Uuid,
    error: ApiError,
}

impl Rejected {
    fn new(command: &Command, error: ApiError) -> Self {
        tracing::debug!(request_id = %command.request_id, error = %error, "rejected before sending");
        Self {
            request_id: command.request_id,
            error,
        }
    }
}

impl From<Rejected> for ApiError {
    fn from(rejected: Rejected) -> Self {
        rejected.error
    }
}

#[derive(Clone)]
pub struct MusicClient {
    settings: ClientSettings,
    handler: ApiRequestHandler,
}

impl MusicClient {
    /// Client with the default pipeline, timing out after the configured
    /// request timeout.
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let handler = ApiRequestHandler::with_defaults()?.with_timeout(settings.request_timeout());
        Ok(Self::with_handler(settings, handler))
    }

    pub fn with_handler(settings: ClientSettings, handler: ApiRequestHandler) -> Self {
        Self { settings, handler }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn handler(&self) -> &ApiRequestHandler {
        &self.handler
    }

    pub fn server_time_utc(&self) -> DateTime<Utc> {
        self.handler.server_time_utc()
    }

    /// Newest products in `category`.
    pub fn get_new_releases<F>(
        &self,
        category: Category,
        start_index: usize,
        item_count: usize,
        callback: Option<F>,
    ) -> Result<(), ApiError>
    where
        F: FnOnce(Response<ListPage<Product>>) + Send + 'static,
    {
        let callback = callback.ok_or(ApiError::MissingCallback)?;
        self.dispatch::<ListPage<Product>, F>(new_releases(category, start_index, item_count)?, callback)
    }

    /// Artists whose name matches `term`.
    pub fn search_artists<F>(
        &self,
        term: &str,
        start_index: usize,
        item_count: usize,
        callback: Option<F>,
    ) -> Result<(), ApiError>
    where
        F: FnOnce(Response<ListPage<Artist>>) + Send + 'static,
    {
        let callback = callback.ok_or(ApiError::MissingCallback)?;
        self.dispatch::<ListPage<Artist>, F>(search_artists(term, start_index, item_count)?, callback)
    }

    pub fn get_top_artists<F>(&self, start_index: usize, item_count: usize, callback: Option<F>) -> Result<(), ApiError>
    where
        F: FnOnce(Response<ListPage<Artist>>) + Send + 'static,
    {
        let callback = callback.ok_or(ApiError::MissingCallback)?;
        self.dispatch::<ListPage<Artist>, F>(top_artists(start_index, item_count), callback)
    }

    pub async fn new_releases(
        &self,
        category: Category,
        start_index: usize,
        item_count: usize,
    ) -> Response<ListPage<Product>> {
        self.fetch(new_releases(category, start_index, item_count)).await
    }

    pub async fn artists_matching(&self, term: &str, start_index: usize, item_count: usize) -> Response<ListPage<Artist>> {
        self.fetch(search_artists(term, start_index, item_count)).await
    }

    pub async fn top_artists(&self, start_index: usize, item_count: usize) -> Response<ListPage<Artist>> {
        self.fetch(Ok(top_artists(start_index, item_count))).await
    }

    fn dispatch<T, F>(&self, prepared: Prepared, callback: F) -> Result<(), ApiError>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
        F: FnOnce(Response<T>) + Send + 'static,
    {
        self.handler.send_request_async(
            &prepared.command,
            &self.settings,
            &prepared.query,
            Some(json_callback::<T, F>(callback)),
            None,
        )
    }

    async fn fetch<T>(&self, prepared: Result<Prepared, Rejected>) -> Response<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        match prepared {
            Ok(p) => {
                self.handler
                    .send_request(&p.command, &self.settings, &p.query, None)
                    .await
            }
            Err(r) => Response::failure(None, r.error, None, r.request_id),
        }
    }
}

fn paging(start_index: usize, item_count: usize) -> Vec<(String, String)> {
    vec![
        ("startindex".to_string(), start_index.to_string()),
        ("itemsperpage".to_string(), item_count.to_string()),
    ]
}

fn new_releases(category: Category, start_index: usize, item_count: usize) -> Result<Prepared, Rejected> {
    let command = Command::get(&format!("products/new/{category}/"));
    if category == Category::Unknown {
        let error = ApiError::InvalidArgument("category must be album, single or track".to_string());
        return Err(Rejected::new(&command, error));
    }
    Ok(Prepared {
        command,
        query: paging(start_index, item_count),
    })
}

fn search_artists(term: &str, start_index: usize, item_count: usize) -> Result<Prepared, Rejected> {
    let command = Command::get("search/");
    let term = term.trim();
    if term.is_empty() {
        return Err(Rejected::new(&command, ApiError::InvalidArgument("search term is empty".to_string())));
    }
    let mut query = vec![
        ("q".to_string(), term.to_string()),
        ("category".to_string(), "artist".to_string()),
    ];
    query.extend(paging(start_index, item_count));
    Ok(Prepared { command, query })
}

fn top_artists(start_index: usize, item_count: usize) -> Prepared {
    Prepared {
        command: Command::get("artists/top/"),
        query: paging(start_index, item_count),
    }
}
