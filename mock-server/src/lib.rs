use std::{collections::HashSet, io::Write, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// `Date` sent by the top-artists route, paired with `FIXED_AGE_SECS`.
pub const FIXED_DATE: &str = "Sat, 01 Jun 2013 12:00:00 GMT";
pub const FIXED_AGE_SECS: u64 = 30;
/// The only authorization code the token route accepts.
pub const VALID_CODE: &str = "valid-code";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub startindex: usize,
    pub itemsperpage: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub startindex: usize,
    #[serde(default = "default_page_size")]
    pub itemsperpage: usize,
}

fn default_page_size() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub startindex: usize,
    #[serde(default = "default_page_size")]
    pub itemsperpage: usize,
}

impl SearchQuery {
    fn paging(&self) -> Paging {
        Paging {
            startindex: self.startindex,
            itemsperpage: self.itemsperpage,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlowQuery {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    2_000
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
}

pub struct Catalog {
    pub products: Vec<Product>,
    pub artists: Vec<Artist>,
    /// Refresh tokens handed out so far.
    pub refresh_tokens: RwLock<HashSet<String>>,
}

pub type Db = Arc<Catalog>;

fn product(id: &str, name: &str, category: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
    }
}

fn artist(id: &str, name: &str) -> Artist {
    Artist {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn seed() -> Catalog {
    Catalog {
        products: vec![
            product("27015553", "Back In Black", "Album"),
            product("27015554", "Highway To Hell", "Album"),
            product("27015555", "Let There Be Rock", "Album"),
            product("31140214", "Uprising", "Single"),
            product("31140215", "Starlight", "Track"),
        ],
        artists: vec![
            artist("279360", "Muse"),
            artist("135245", "Green Day"),
            artist("110891", "Simon & Garfunkel"),
            artist("104569", "Coldplay"),
            artist("191836", "Greenslade"),
        ],
        refresh_tokens: RwLock::new(HashSet::new()),
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(seed());
    Router::new()
        .route("/1.x/{country}/products/new/{category}/", get(new_releases))
        .route("/1.x/{country}/search/", get(search))
        .route("/1.x/{country}/artists/top/", get(top_artists))
        .route("/1.x/{country}/slow/", get(slow))
        .route("/1.x/token/", post(token))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn page<T: Clone>(items: &[T], paging: &Paging) -> ListPage<T> {
    ListPage {
        items: items
            .iter()
            .skip(paging.startindex)
            .take(paging.itemsperpage)
            .cloned()
            .collect(),
        total: items.len(),
        startindex: paging.startindex,
        itemsperpage: paging.itemsperpage,
    }
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("gzip"))
}

/// JSON body, gzip-compressed when the client asked for it.
fn json_negotiated<T: Serialize>(request_headers: &HeaderMap, value: &T) -> Response {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    if !accepts_gzip(request_headers) {
        return ([(header::CONTENT_TYPE, "application/json")], body).into_response();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    match encoder.write_all(&body).and_then(|_| encoder.finish()) {
        Ok(compressed) => (
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            compressed,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn new_releases(
    State(db): State<Db>,
    Path((_country, category)): Path<(String, String)>,
    Query(paging): Query<Paging>,
    headers: HeaderMap,
) -> Response {
    if !matches!(category.as_str(), "album" | "single" | "track") {
        return (StatusCode::BAD_REQUEST, "unknown category").into_response();
    }
    let matching: Vec<Product> = db
        .products
        .iter()
        .filter(|p| p.category.eq_ignore_ascii_case(&category))
        .cloned()
        .collect();
    json_negotiated(&headers, &page(&matching, &paging))
}

async fn search(
    State(db): State<Db>,
    Path(_country): Path<String>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> Response {
    let term = match query.q.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => term.to_ascii_lowercase(),
        _ => return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "q is required"}))).into_response(),
    };
    if query.category.as_deref().is_some_and(|c| c != "artist") {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "unsupported category"}))).into_response();
    }
    let matching: Vec<Artist> = db
        .artists
        .iter()
        .filter(|a| a.name.to_ascii_lowercase().contains(&term))
        .cloned()
        .collect();
    json_negotiated(&headers, &page(&matching, &query.paging()))
}

async fn top_artists(State(db): State<Db>, Query(paging): Query<Paging>) -> Response {
    let mut response = Json(page(&db.artists, &paging)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::DATE, HeaderValue::from_static(FIXED_DATE));
    headers.insert(header::AGE, HeaderValue::from(FIXED_AGE_SECS));
    response
}

async fn slow(Query(query): Query<SlowQuery>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(query.delay_ms)).await;
    Json(serde_json::json!({}))
}

async fn token(State(db): State<Db>, Form(request): Form<TokenRequest>) -> Response {
    let granted = match request.grant_type.as_str() {
        "authorization_code" => request.code.as_deref() == Some(VALID_CODE),
        "refresh_token" => match request.refresh_token.as_deref() {
            Some(token) => db.refresh_tokens.read().await.contains(token),
            None => false,
        },
        _ => false,
    };
    if !granted || request.client_id.is_empty() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid_grant"})),
        )
            .into_response();
    }

    let response = TokenResponse {
        access_token: Uuid::new_v4().to_string(),
        refresh_token: Uuid::new_v4().to_string(),
        expires_in: 3600,
    };
    db.refresh_tokens
        .write()
        .await
        .insert(response.refresh_token.clone());
    Json(response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_page_serializes_wire_names() {
        let paging = Paging {
            startindex: 1,
            itemsperpage: 2,
        };
        let json = serde_json::to_value(page(&seed().artists, &paging)).unwrap();
        assert_eq!(json["total"], 5);
        assert_eq!(json["startindex"], 1);
        assert_eq!(json["itemsperpage"], 2);
        assert_eq!(json["items"][0]["name"], "Green Day");
    }

    #[test]
    fn paging_defaults_apply() {
        let paging: Paging = serde_json::from_str("{}").unwrap();
        assert_eq!(paging.startindex, 0);
        assert_eq!(paging.itemsperpage, 10);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let paging = Paging {
            startindex: 50,
            itemsperpage: 10,
        };
        let listed = page(&seed().products, &paging);
        assert!(listed.items.is_empty());
        assert_eq!(listed.total, 5);
    }

    #[test]
    fn gzip_is_detected_case_insensitively() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("deflate, GZIP"));
        assert!(accepts_gzip(&headers));
    }

    #[test]
    fn token_request_allows_missing_optional_fields() {
        let request: TokenRequest =
            serde_json::from_str(r#"{"grant_type":"authorization_code","client_id":"id"}"#).unwrap();
        assert!(request.code.is_none());
        assert!(request.client_secret.is_none());
    }
}
