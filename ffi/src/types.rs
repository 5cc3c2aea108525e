//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! tagged enums with explicit discriminants. Conversion functions live here
//! to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::CString;
use std::os::raw::c_char;

use music_core::auth::AuthResultCode;
use music_core::decoder::Decoded;
use music_core::error::ApiError;
use music_core::tasks::LaunchUris;
use music_core::types::{Artist, Category, ListPage, Product};
use music_core::ServerTimeTracker;

/// Heap C string; interior NULs collapse to an empty string.
pub(crate) fn c_string(value: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(value).unwrap_or_default().into_raw()
}

/// Hand a vector to C as a pointer/length pair. Empty vectors become null.
pub(crate) fn leak_vec<T>(items: Vec<T>) -> (*mut T, u32) {
    if items.is_empty() {
        return (std::ptr::null_mut(), 0);
    }
    let mut items = items.into_boxed_slice();
    let len = items.len() as u32;
    let ptr = items.as_mut_ptr();
    std::mem::forget(items);
    (ptr, len)
}

/// Opaque handle to a `ServerTimeTracker`.
pub struct FfiServerTime {
    pub(crate) inner: ServerTimeTracker,
}

// ---------------------------------------------------------------------------
// Deep links
// ---------------------------------------------------------------------------

/// Which deep-link task to compute URIs for.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiTaskKind {
    Launch = 0,
    MusicSearch = 1,
    PlayMix = 2,
    ShowArtist = 3,
    ShowGigs = 4,
    ShowProduct = 5,
}

/// App-to-app URI plus its web fallback.
#[repr(C)]
pub struct FfiLaunchUris {
    pub app: *mut c_char,
    pub web: *mut c_char,
}

impl FfiLaunchUris {
    pub(crate) fn from_core(uris: LaunchUris) -> *mut Self {
        Box::into_raw(Box::new(FfiLaunchUris {
            app: c_string(uris.app.as_str()),
            web: c_string(uris.web.as_str()),
        }))
    }
}

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiAuthResultCode {
    Unknown = 0,
    Success = 1,
    Cancelled = 2,
    AccessDenied = 3,
    InvalidScope = 4,
    UnauthorizedClient = 5,
    ServerError = 6,
}

impl From<AuthResultCode> for FfiAuthResultCode {
    fn from(code: AuthResultCode) -> Self {
        match code {
            AuthResultCode::Unknown => FfiAuthResultCode::Unknown,
            AuthResultCode::Success => FfiAuthResultCode::Success,
            AuthResultCode::Cancelled => FfiAuthResultCode::Cancelled,
            AuthResultCode::AccessDenied => FfiAuthResultCode::AccessDenied,
            AuthResultCode::InvalidScope => FfiAuthResultCode::InvalidScope,
            AuthResultCode::UnauthorizedClient => FfiAuthResultCode::UnauthorizedClient,
            AuthResultCode::ServerError => FfiAuthResultCode::ServerError,
        }
    }
}

/// Parsed OAuth redirect. `code` is null unless `result` is `Success`.
#[repr(C)]
pub struct FfiAuthRedirect {
    pub result: FfiAuthResultCode,
    pub code: *mut c_char,
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// An HTTP response the host received, as C-compatible plain data.
///
/// `status` 0 means no status was obtained. `resolved_uri`,
/// `content_type` and `content_encoding` may be null. The FFI layer reads
/// but does not free these fields.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub resolved_uri: *const c_char,
    pub content_type: *const c_char,
    pub content_encoding: *const c_char,
    pub body: *const u8,
    pub body_len: usize,
}

/// How the body of a successful response should be parsed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiPayloadKind {
    Text = 0,
    ProductList = 1,
    ArtistList = 2,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOutcome {
    Success = 0,
    Error = 1,
    /// Synthesized by the platform while offline; retry later.
    OfflineNotFound = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    Status = 1,
    Body = 2,
    Parse = 3,
    Transport = 4,
    CallFailed = 5,
    InvalidArgument = 6,
    Panic = 7,
    NullArg = 8,
}

impl From<&ApiError> for FfiErrorCode {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Status { .. } => FfiErrorCode::Status,
            ApiError::Body(_) => FfiErrorCode::Body,
            ApiError::Parse(_) => FfiErrorCode::Parse,
            ApiError::Transport(_) => FfiErrorCode::Transport,
            ApiError::CallFailed => FfiErrorCode::CallFailed,
            ApiError::MissingCallback | ApiError::InvalidUri(_) | ApiError::InvalidArgument(_) => {
                FfiErrorCode::InvalidArgument
            }
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiCategory {
    Unknown = 0,
    Album = 1,
    Single = 2,
    Track = 3,
}

impl From<Category> for FfiCategory {
    fn from(category: Category) -> Self {
        match category {
            Category::Unknown => FfiCategory::Unknown,
            Category::Album => FfiCategory::Album,
            Category::Single => FfiCategory::Single,
            Category::Track => FfiCategory::Track,
        }
    }
}

/// Tag that tells `music_free_result` what `FfiMusicResult::data` points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDataTag {
    None = 0,
    Text = 1,
    ProductList = 2,
    ArtistList = 3,
}

#[repr(C)]
pub struct FfiProduct {
    pub id: *mut c_char,
    pub name: *mut c_char,
    pub category: FfiCategory,
}

#[repr(C)]
pub struct FfiProductList {
    pub items: *mut FfiProduct,
    pub len: u32,
    pub total: u32,
}

#[repr(C)]
pub struct FfiArtist {
    pub id: *mut c_char,
    pub name: *mut c_char,
}

#[repr(C)]
pub struct FfiArtistList {
    pub items: *mut FfiArtist,
    pub len: u32,
    pub total: u32,
}

/// Typed payloads that can travel in an `FfiMusicResult`.
pub(crate) trait IntoFfiData {
    fn into_ffi(self) -> (FfiDataTag, *mut std::ffi::c_void);
}

impl IntoFfiData for String {
    fn into_ffi(self) -> (FfiDataTag, *mut std::ffi::c_void) {
        (FfiDataTag::Text, c_string(self) as *mut std::ffi::c_void)
    }
}

impl IntoFfiData for ListPage<Product> {
    fn into_ffi(self) -> (FfiDataTag, *mut std::ffi::c_void) {
        let total = self.total as u32;
        let (items, len) = leak_vec(
            self.items
                .into_iter()
                .map(|p| FfiProduct {
                    id: c_string(p.id),
                    name: c_string(p.name),
                    category: p.category.into(),
                })
                .collect(),
        );
        let list = Box::new(FfiProductList { items, len, total });
        (FfiDataTag::ProductList, Box::into_raw(list) as *mut std::ffi::c_void)
    }
}

impl IntoFfiData for ListPage<Artist> {
    fn into_ffi(self) -> (FfiDataTag, *mut std::ffi::c_void) {
        let total = self.total as u32;
        let (items, len) = leak_vec(
            self.items
                .into_iter()
                .map(|a| FfiArtist {
                    id: c_string(a.id),
                    name: c_string(a.name),
                })
                .collect(),
        );
        let list = Box::new(FfiArtistList { items, len, total });
        (FfiDataTag::ArtistList, Box::into_raw(list) as *mut std::ffi::c_void)
    }
}

/// Result envelope for `music_decode_response`.
///
/// On success `outcome` is `Success`, `error_code` is `Ok` and `data` points
/// to the payload tagged by `data_tag`. On failure `error_message` is a
/// human-readable C string and `error_body` holds the raw response body when
/// there was one. An `OfflineNotFound` outcome carries neither data nor error.
#[repr(C)]
pub struct FfiMusicResult {
    pub outcome: FfiOutcome,
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub error_body: *mut c_char,
    pub http_status: u16,
    pub data_tag: FfiDataTag,
    pub data: *mut std::ffi::c_void,
}

impl FfiMusicResult {
    fn empty(outcome: FfiOutcome, error_code: FfiErrorCode, http_status: u16) -> Self {
        FfiMusicResult {
            outcome,
            error_code,
            error_message: std::ptr::null_mut(),
            error_body: std::ptr::null_mut(),
            http_status,
            data_tag: FfiDataTag::None,
            data: std::ptr::null_mut(),
        }
    }

    pub(crate) fn from_decoded<T: IntoFfiData>(decoded: Decoded<T>) -> *mut Self {
        let http_status = decoded.status_code.map_or(0, |s| s.as_u16());
        let result = if decoded.offline_not_found {
            Self::empty(FfiOutcome::OfflineNotFound, FfiErrorCode::Ok, http_status)
        } else if let Some(value) = decoded.result {
            let (data_tag, data) = value.into_ffi();
            FfiMusicResult {
                data_tag,
                data,
                ..Self::empty(FfiOutcome::Success, FfiErrorCode::Ok, http_status)
            }
        } else {
            let err = decoded.error.unwrap_or(ApiError::CallFailed);
            FfiMusicResult {
                error_message: c_string(err.to_string()),
                error_body: decoded.raw_body.map_or(std::ptr::null_mut(), c_string),
                ..Self::empty(FfiOutcome::Error, FfiErrorCode::from(&err), http_status)
            }
        };
        Box::into_raw(Box::new(result))
    }

    /// Build an error result for a null argument.
    pub(crate) fn null_arg(name: &str) -> *mut Self {
        let result = FfiMusicResult {
            error_message: c_string(format!("null argument: {name}")),
            ..Self::empty(FfiOutcome::Error, FfiErrorCode::NullArg, 0)
        };
        Box::into_raw(Box::new(result))
    }

    /// Build an error result for a caught panic.
    pub(crate) fn panic(msg: &str) -> *mut Self {
        let result = FfiMusicResult {
            error_message: c_string(msg),
            ..Self::empty(FfiOutcome::Error, FfiErrorCode::Panic, 0)
        };
        Box::into_raw(Box::new(result))
    }
}
