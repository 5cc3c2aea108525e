//! C-ABI wrapper around `music-core`.
//!
//! # Overview
//! Exposes the parts of the client that need no async runtime: response
//! decoding (gzip, status classification, offline detection, typed lists),
//! server clock tracking, deep-link URIs and the OAuth redirect helpers.
//! Hosts that do their own networking feed responses in and read typed
//! results out.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - A single `FfiMusicResult` envelope with `FfiDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `music_free_*` function to release them.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::catch_unwind;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use music_core::auth::{authorize_uri, parse_completed_flags, Scope};
use music_core::decoder::ResponseDecoder;
use music_core::http::TransportResponse;
use music_core::response::parse_json;
use music_core::tasks::{
    DeepLinkTask, LaunchTask, MusicSearchTask, PlayMixTask, ShowArtistTask, ShowGigsTask, ShowProductTask,
};
use music_core::types::{Artist, ListPage, Product};
use music_core::{GzipHandler, ServerTimeTracker};

use types::*;

/// Borrow a C string, treating null and invalid UTF-8 as absent.
fn opt_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Convert an `FfiHttpResponse` to a core `TransportResponse`.
fn ffi_response_to_core(resp: &FfiHttpResponse) -> TransportResponse {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (CONTENT_TYPE, opt_str(resp.content_type)),
        (CONTENT_ENCODING, opt_str(resp.content_encoding)),
    ] {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }
    let body = if resp.body.is_null() || resp.body_len == 0 {
        Bytes::new()
    } else {
        Bytes::copy_from_slice(unsafe { std::slice::from_raw_parts(resp.body, resp.body_len) })
    };
    TransportResponse {
        status: StatusCode::from_u16(resp.status).ok(),
        resolved_uri: opt_str(resp.resolved_uri).map(str::to_string),
        headers,
        body,
        body_error: None,
    }
}

/// Decode a response the host received, inflating gzip bodies.
///
/// `kind` selects how a successful body is parsed; the result's `data_tag`
/// reports what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn music_decode_response(
    response: *const FfiHttpResponse,
    kind: FfiPayloadKind,
) -> *mut FfiMusicResult {
    catch_unwind(|| {
        if response.is_null() {
            return FfiMusicResult::null_arg("response");
        }
        let resp = ffi_response_to_core(unsafe { &*response });
        let decoder = ResponseDecoder::new(Arc::new(GzipHandler));
        match kind {
            FfiPayloadKind::Text => FfiMusicResult::from_decoded(decoder.decode(Ok(resp), |raw| Ok(raw.to_string()))),
            FfiPayloadKind::ProductList => {
                FfiMusicResult::from_decoded(decoder.decode(Ok(resp), parse_json::<ListPage<Product>>))
            }
            FfiPayloadKind::ArtistList => {
                FfiMusicResult::from_decoded(decoder.decode(Ok(resp), parse_json::<ListPage<Artist>>))
            }
        }
    })
    .unwrap_or_else(|_| FfiMusicResult::panic("panic in music_decode_response"))
}

// ---------------------------------------------------------------------------
// Server time
// ---------------------------------------------------------------------------

/// Create a tracker with no offset captured.
/// The caller must free it with `music_server_time_free`.
#[unsafe(no_mangle)]
pub extern "C" fn music_server_time_new() -> *mut FfiServerTime {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiServerTime {
            inner: ServerTimeTracker::new(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Offer raw `Date` and `Age` header values. `age` may be null.
///
/// Returns true only if this call captured the offset.
#[unsafe(no_mangle)]
pub extern "C" fn music_server_time_update(
    tracker: *const FfiServerTime,
    date: *const c_char,
    age: *const c_char,
) -> bool {
    catch_unwind(|| {
        if tracker.is_null() {
            return false;
        }
        let tracker = unsafe { &*tracker };
        tracker
            .inner
            .update_from_values_at(opt_str(date), opt_str(age), Utc::now())
    })
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn music_server_time_is_captured(tracker: *const FfiServerTime) -> bool {
    if tracker.is_null() {
        return false;
    }
    catch_unwind(|| unsafe { &*tracker }.inner.is_captured()).unwrap_or(false)
}

/// Server minus local clock in milliseconds; 0 until captured.
#[unsafe(no_mangle)]
pub extern "C" fn music_server_time_offset_ms(tracker: *const FfiServerTime) -> i64 {
    if tracker.is_null() {
        return 0;
    }
    catch_unwind(|| {
        unsafe { &*tracker }
            .inner
            .offset()
            .map_or(0, |offset| offset.num_milliseconds())
    })
    .unwrap_or(0)
}

/// Current server time as Unix milliseconds.
#[unsafe(no_mangle)]
pub extern "C" fn music_server_time_now_ms(tracker: *const FfiServerTime) -> i64 {
    catch_unwind(|| {
        if tracker.is_null() {
            return Utc::now().timestamp_millis();
        }
        unsafe { &*tracker }
            .inner
            .current_server_time_utc()
            .timestamp_millis()
    })
    .unwrap_or(0)
}

/// Free a tracker created by `music_server_time_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn music_server_time_free(tracker: *mut FfiServerTime) {
    if !tracker.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(tracker) });
        });
    }
}

// ---------------------------------------------------------------------------
// Deep links
// ---------------------------------------------------------------------------

/// Compute the app and web URIs of a deep-link task.
///
/// `primary` is the task's main parameter: search terms, mix id, artist id
/// or product id. `secondary` is the artist name for `PlayMix` and
/// `ShowArtist`. Either may be null. Returns null when a required parameter
/// is missing.
#[unsafe(no_mangle)]
pub extern "C" fn music_task_uris(
    kind: FfiTaskKind,
    primary: *const c_char,
    secondary: *const c_char,
) -> *mut FfiLaunchUris {
    catch_unwind(|| {
        let primary = opt_str(primary).map(str::to_string);
        let secondary = opt_str(secondary).map(str::to_string);
        let uris = match kind {
            FfiTaskKind::Launch => LaunchTask.uris(),
            FfiTaskKind::MusicSearch => MusicSearchTask { search_terms: primary }.uris(),
            FfiTaskKind::PlayMix => PlayMixTask {
                mix_id: primary,
                artist_name: secondary,
            }
            .uris(),
            FfiTaskKind::ShowArtist => ShowArtistTask {
                artist_id: primary,
                artist_name: secondary,
            }
            .uris(),
            FfiTaskKind::ShowGigs => ShowGigsTask { search_terms: primary }.uris(),
            FfiTaskKind::ShowProduct => ShowProductTask { product_id: primary }.uris(),
        };
        match uris {
            Ok(uris) => FfiLaunchUris::from_core(uris),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

/// Build the authorize page URI. `scopes` is a bitmask: 1 = play history,
/// 2 = notifications, 4 = taste profile.
///
/// Returns null if an argument is null or the base URI is invalid.
/// The caller must free the string with `music_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn music_authorize_uri(
    secure_api_base_uri: *const c_char,
    client_id: *const c_char,
    scopes: u32,
) -> *mut c_char {
    catch_unwind(|| {
        let (Some(base), Some(client_id)) = (opt_str(secure_api_base_uri), opt_str(client_id)) else {
            return std::ptr::null_mut();
        };
        let selected: Vec<Scope> = Scope::ALL
            .iter()
            .enumerate()
            .filter(|(bit, _)| scopes & (1 << bit) != 0)
            .map(|(_, scope)| *scope)
            .collect();
        match authorize_uri(base, client_id, &selected) {
            Ok(uri) => c_string(uri.as_str()),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Read `code=` / `error=` from a completed OAuth redirect.
///
/// Returns null if `response_data` is null or carries neither flag.
#[unsafe(no_mangle)]
pub extern "C" fn music_parse_auth_redirect(response_data: *const c_char) -> *mut FfiAuthRedirect {
    catch_unwind(|| {
        let Some(data) = opt_str(response_data) else {
            return std::ptr::null_mut();
        };
        match parse_completed_flags(data) {
            Some((result, code)) => Box::into_raw(Box::new(FfiAuthRedirect {
                result: result.into(),
                code: code.map_or(std::ptr::null_mut(), c_string),
            })),
            None => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

fn free_c_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Free a string returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn music_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| free_c_string(s));
}

/// Free an `FfiLaunchUris` returned by `music_task_uris`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn music_free_launch_uris(uris: *mut FfiLaunchUris) {
    if uris.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let uris = unsafe { Box::from_raw(uris) };
        free_c_string(uris.app);
        free_c_string(uris.web);
    });
}

/// Free an `FfiAuthRedirect` returned by `music_parse_auth_redirect`.
#[unsafe(no_mangle)]
pub extern "C" fn music_free_auth_redirect(redirect: *mut FfiAuthRedirect) {
    if redirect.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let redirect = unsafe { Box::from_raw(redirect) };
        free_c_string(redirect.code);
    });
}

/// Free an `FfiMusicResult` returned by `music_decode_response`.
/// Safe to call with null. Uses `data_tag` to determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn music_free_result(result: *mut FfiMusicResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        free_c_string(result.error_message);
        free_c_string(result.error_body);
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            FfiDataTag::None => {}
            FfiDataTag::Text => free_c_string(result.data as *mut c_char),
            FfiDataTag::ProductList => {
                let list = unsafe { Box::from_raw(result.data as *mut FfiProductList) };
                if !list.items.is_null() {
                    let items = unsafe { Vec::from_raw_parts(list.items, list.len as usize, list.len as usize) };
                    for p in items {
                        free_c_string(p.id);
                        free_c_string(p.name);
                    }
                }
            }
            FfiDataTag::ArtistList => {
                let list = unsafe { Box::from_raw(result.data as *mut FfiArtistList) };
                if !list.items.is_null() {
                    let items = unsafe { Vec::from_raw_parts(list.items, list.len as usize, list.len as usize) };
                    for a in items {
                        free_c_string(a.id);
                        free_c_string(a.name);
                    }
                }
            }
        }
    });
}
