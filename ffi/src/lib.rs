//! C-ABI wrapper around `gemini-core`.
//!
//! # Overview
//! Exposes fetch, parse, render and resolve through `extern "C"` functions
//! so front ends written in other languages (a GUI shell, an HTTP proxy)
//! can drive the client without knowing anything about rustls or the
//! protocol's framing.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - `FfiResponse` and `FfiDocument` are result envelopes: an error code and
//!   message on failure, the payload on success.
//! - Fetches are blocking and use `ClientConfig::from_env()`; callers run
//!   them on a worker thread if they have a UI to keep alive.
//! - The C caller owns all returned pointers and must call the matching
//!   `gemini_free_*` function to release them.

pub mod types;

use std::panic::catch_unwind;
use std::path::PathBuf;
use std::ptr;
use std::os::raw::c_char;

use gemini_core::{ClientConfig, Credentials, GeminiClient};

use types::*;

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Fetch `url`, following redirects.
///
/// `ca_cert`, `client_cert` and `key` are PEM file paths; pass all three to
/// present a client certificate or all null for an anonymous request. A
/// partial set yields a `60` response without any network traffic.
///
/// Protocol failures (bad header, too many redirects, `5x` statuses) come
/// back with `error_code = Ok` and the status set; only transport problems
/// set an error code. The caller must free the result with
/// `gemini_free_response`.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_fetch(
    url: *const c_char,
    ca_cert: *const c_char,
    client_cert: *const c_char,
    key: *const c_char,
) -> *mut FfiResponse {
    catch_unwind(|| {
        let Some(url) = (unsafe { read_str(url) }) else {
            return FfiResponse::error(FfiErrorCode::NullArg, "null argument: url");
        };
        let path = |p| unsafe { read_str(p) }.map(|s| PathBuf::from(s.into_owned()));
        let credentials = Credentials {
            ca_cert: path(ca_cert),
            client_cert: path(client_cert),
            key: path(key),
        };

        let client = GeminiClient::new(ClientConfig::from_env());
        match client.fetch(&url, &credentials) {
            Ok(resp) => FfiResponse::from_core(resp),
            Err(e) => {
                log::debug!("gemini_fetch {url}: {e}");
                FfiResponse::from_error(&e)
            }
        }
    })
    .unwrap_or_else(|_| {
        log::error!("panic in gemini_fetch");
        FfiResponse::error(FfiErrorCode::Panic, "panic in gemini_fetch")
    })
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Parse a gemtext body. Relative link targets are resolved against `base`.
///
/// The caller must free the result with `gemini_free_document`.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_parse(base: *const c_char, text: *const c_char) -> *mut FfiDocument {
    catch_unwind(|| {
        let Some(base) = (unsafe { read_str(base) }) else {
            return FfiDocument::error(FfiErrorCode::NullArg, "null argument: base");
        };
        let Some(text) = (unsafe { read_str(text) }) else {
            return FfiDocument::error(FfiErrorCode::NullArg, "null argument: text");
        };
        FfiDocument::from_core(gemini_core::parse(&base, &text))
    })
    .unwrap_or_else(|_| FfiDocument::error(FfiErrorCode::Panic, "panic in gemini_parse"))
}

/// Decode and render the body of a fetched response.
///
/// Gemtext bodies are parsed for links; other `text/*` bodies come back as
/// plain lines. A response without a textual body yields `NoDocument`, a
/// body that is invalid in its declared charset yields `Decode`. The
/// response is not consumed.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_render(response: *const FfiResponse) -> *mut FfiDocument {
    catch_unwind(|| {
        if response.is_null() {
            return FfiDocument::error(FfiErrorCode::NullArg, "null argument: response");
        }
        let Some(resp) = (unsafe { (*response).to_core() }) else {
            return FfiDocument::error(FfiErrorCode::NoDocument, "response carries an error");
        };
        match resp.render() {
            Ok(Some(doc)) => FfiDocument::from_core(doc),
            Ok(None) => FfiDocument::error(
                FfiErrorCode::NoDocument,
                &format!("no text body ({} {})", resp.status(), resp.meta()),
            ),
            Err(e) => FfiDocument::from_decode_error(&e),
        }
    })
    .unwrap_or_else(|_| FfiDocument::error(FfiErrorCode::Panic, "panic in gemini_render"))
}

/// Resolve `relative` against `base`. Returns null if either is null.
///
/// The caller must free the result with `gemini_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_resolve(base: *const c_char, relative: *const c_char) -> *mut c_char {
    catch_unwind(|| {
        match unsafe { (read_str(base), read_str(relative)) } {
            (Some(base), Some(relative)) => c_string(gemini_core::resolve(&base, &relative)),
            _ => ptr::null_mut(),
        }
    })
    .unwrap_or(ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a response returned by `gemini_fetch`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_free_response(response: *mut FfiResponse) {
    if response.is_null() {
        return;
    }
    let _ = catch_unwind(|| unsafe { FfiResponse::free(response) });
}

/// Free a document returned by `gemini_parse` or `gemini_render`. Safe to
/// call with null.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_free_document(document: *mut FfiDocument) {
    if document.is_null() {
        return;
    }
    let _ = catch_unwind(|| unsafe { FfiDocument::free(document) });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn gemini_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| unsafe { free_c_string(s) });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    use gemini_core::Response;

    fn str_of<'a>(p: *const c_char) -> &'a str {
        assert!(!p.is_null());
        unsafe { CStr::from_ptr(p) }.to_str().unwrap()
    }

    fn lines_of(doc: &FfiDocument) -> Vec<&str> {
        if doc.lines.is_null() {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(doc.lines, doc.lines_len as usize) }
            .iter()
            .map(|&l| str_of(l))
            .collect()
    }

    fn links_of(doc: &FfiDocument) -> Vec<(&str, &str)> {
        if doc.links.is_null() {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(doc.links, doc.links_len as usize) }
            .iter()
            .map(|l| (str_of(l.target), str_of(l.label)))
            .collect()
    }

    // --- fetch ---

    #[test]
    fn fetch_partial_credentials_is_status_60() {
        let url = CString::new("no-such-host.invalid/").unwrap();
        let ca = CString::new("/nonexistent/ca.pem").unwrap();
        let resp = gemini_fetch(url.as_ptr(), ca.as_ptr(), ptr::null(), ptr::null());
        let r = unsafe { &*resp };

        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert!(r.error_message.is_null());
        assert_eq!(str_of(r.status), "60");
        assert_eq!(r.class, FfiStatusClass::CertRequired);
        assert_eq!(str_of(r.url), "gemini://no-such-host.invalid/");
        assert!(!r.has_body);
        assert!(r.body.is_null());

        gemini_free_response(resp);
    }

    #[test]
    fn fetch_foreign_scheme_is_handed_back() {
        let url = CString::new("https://example.com/").unwrap();
        let resp = gemini_fetch(url.as_ptr(), ptr::null(), ptr::null(), ptr::null());
        let r = unsafe { &*resp };

        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert_eq!(str_of(r.status), "30");
        assert_eq!(str_of(r.meta), "https://example.com/");

        gemini_free_response(resp);
    }

    #[test]
    fn fetch_missing_credential_files() {
        let url = CString::new("no-such-host.invalid/").unwrap();
        let missing = CString::new("/nonexistent/x.pem").unwrap();
        let resp = gemini_fetch(url.as_ptr(), missing.as_ptr(), missing.as_ptr(), missing.as_ptr());
        let r = unsafe { &*resp };

        assert_eq!(r.error_code, FfiErrorCode::Credentials);
        assert!(str_of(r.error_message).contains("/nonexistent/x.pem"));
        assert!(r.status.is_null());

        gemini_free_response(resp);
    }

    #[test]
    fn fetch_null_url() {
        let resp = gemini_fetch(ptr::null(), ptr::null(), ptr::null(), ptr::null());
        let r = unsafe { &*resp };
        assert_eq!(r.error_code, FfiErrorCode::NullArg);
        assert_eq!(str_of(r.error_message), "null argument: url");
        gemini_free_response(resp);
    }

    // --- parse ---

    #[test]
    fn parse_lines_and_links() {
        let base = CString::new("gemini://example.org/dir/").unwrap();
        let text = CString::new("# Title\n=> a.gmi First\n```\n=> b.gmi hidden\n```\n=> /c").unwrap();
        let doc = gemini_parse(base.as_ptr(), text.as_ptr());
        let d = unsafe { &*doc };

        assert_eq!(d.error_code, FfiErrorCode::Ok);
        assert_eq!(lines_of(d), vec!["# Title", "=> a.gmi First", "=> b.gmi hidden", "=> /c"]);
        assert_eq!(
            links_of(d),
            vec![
                ("gemini://example.org/dir/a.gmi", "First"),
                ("gemini://example.org/c", "/c"),
            ]
        );

        gemini_free_document(doc);
    }

    #[test]
    fn parse_empty_text_has_null_arrays() {
        let base = CString::new("gemini://example.org/").unwrap();
        let text = CString::new("").unwrap();
        let doc = gemini_parse(base.as_ptr(), text.as_ptr());
        let d = unsafe { &*doc };

        assert_eq!(d.error_code, FfiErrorCode::Ok);
        assert!(d.lines.is_null());
        assert_eq!(d.lines_len, 0);
        assert!(d.links.is_null());

        gemini_free_document(doc);
    }

    #[test]
    fn parse_null_args() {
        let text = CString::new("x").unwrap();
        let doc = gemini_parse(ptr::null(), text.as_ptr());
        assert_eq!(unsafe { &*doc }.error_code, FfiErrorCode::NullArg);
        gemini_free_document(doc);

        let doc = gemini_parse(text.as_ptr(), ptr::null());
        assert_eq!(unsafe { &*doc }.error_code, FfiErrorCode::NullArg);
        gemini_free_document(doc);
    }

    // --- render ---

    #[test]
    fn render_gemtext_response() {
        let resp = FfiResponse::from_core(Response::new(
            "gemini://example.org/",
            "20",
            "text/gemini",
            Some(b"hello\n=> /next Next\n".to_vec()),
        ));
        let doc = gemini_render(resp);
        let d = unsafe { &*doc };

        assert_eq!(d.error_code, FfiErrorCode::Ok);
        assert_eq!(lines_of(d), vec!["hello", "=> /next Next"]);
        assert_eq!(links_of(d), vec![("gemini://example.org/next", "Next")]);

        gemini_free_document(doc);
        gemini_free_response(resp);
    }

    #[test]
    fn render_strict_decode_failure() {
        let resp = FfiResponse::from_core(Response::new(
            "gemini://example.org/",
            "20",
            "text/gemini",
            Some(b"\xff\xfe".to_vec()),
        ));
        let doc = gemini_render(resp);
        assert_eq!(unsafe { &*doc }.error_code, FfiErrorCode::Decode);
        gemini_free_document(doc);
        gemini_free_response(resp);
    }

    #[test]
    fn render_without_text_body() {
        let image = FfiResponse::from_core(Response::new(
            "gemini://example.org/x.png",
            "20",
            "image/png",
            Some(vec![0x89, b'P', b'N', b'G']),
        ));
        let doc = gemini_render(image);
        assert_eq!(unsafe { &*doc }.error_code, FfiErrorCode::NoDocument);
        gemini_free_document(doc);
        gemini_free_response(image);

        let failure = FfiResponse::from_core(Response::new("gemini://example.org/", "51", "Not found", None));
        let doc = gemini_render(failure);
        assert_eq!(unsafe { &*doc }.error_code, FfiErrorCode::NoDocument);
        gemini_free_document(doc);
        gemini_free_response(failure);
    }

    #[test]
    fn render_null_response() {
        let doc = gemini_render(ptr::null());
        assert_eq!(unsafe { &*doc }.error_code, FfiErrorCode::NullArg);
        gemini_free_document(doc);
    }

    #[test]
    fn body_keeps_interior_nul_bytes() {
        let resp = FfiResponse::from_core(Response::new(
            "gemini://example.org/",
            "20",
            "application/octet-stream",
            Some(vec![1, 0, 2]),
        ));
        let r = unsafe { &*resp };
        assert!(r.has_body);
        assert_eq!(unsafe { std::slice::from_raw_parts(r.body, r.body_len) }, &[1, 0, 2]);
        gemini_free_response(resp);
    }

    // --- resolve ---

    #[test]
    fn resolve_relative_reference() {
        let base = CString::new("gemini://example.org/a/b").unwrap();
        let rel = CString::new("../c").unwrap();
        let out = gemini_resolve(base.as_ptr(), rel.as_ptr());
        assert_eq!(str_of(out), "gemini://example.org/c");
        gemini_free_string(out);
    }

    #[test]
    fn resolve_null_returns_null() {
        let rel = CString::new("x").unwrap();
        assert!(gemini_resolve(ptr::null(), rel.as_ptr()).is_null());
        assert!(gemini_resolve(rel.as_ptr(), ptr::null()).is_null());
    }

    // --- free ---

    #[test]
    fn free_null_is_safe() {
        gemini_free_response(ptr::null_mut());
        gemini_free_document(ptr::null_mut());
        gemini_free_string(ptr::null_mut());
    }
}
