//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with C-compatible representations:
//! `*mut c_char` instead of `String`, pointer plus length instead of `Vec`,
//! and enums with explicit discriminants. Conversions live here so `lib.rs`
//! stays focused on the `extern "C"` surface; the matching release code
//! lives next to each conversion so allocation and free cannot drift apart.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use gemini_core::{DecodeError, Document, FetchError, Response, StatusClass};

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Copy `s` into a C string owned by the caller. Interior NULs, which a
/// server is free to send, are dropped rather than truncating the text.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    let mut bytes = s.into();
    bytes.retain(|&b| b != 0);
    CString::new(bytes).unwrap_or_default().into_raw()
}

/// Borrow a caller-provided C string. Null yields `None`; invalid UTF-8 is
/// replaced lossily.
///
/// # Safety
/// `p` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn read_str<'a>(p: *const c_char) -> Option<std::borrow::Cow<'a, str>> {
    if p.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(p) }.to_string_lossy())
    }
}

/// Release a string produced by `c_string`. Null is ignored.
///
/// # Safety
/// `p` must be null or come from `c_string` and not have been freed.
pub(crate) unsafe fn free_c_string(p: *mut c_char) {
    if !p.is_null() {
        drop(unsafe { CString::from_raw(p) });
    }
}

/// Leak a boxed slice as pointer plus length. Empty input gives null.
fn leak_slice<T>(items: Vec<T>) -> (*mut T, u32) {
    if items.is_empty() {
        return (ptr::null_mut(), 0);
    }
    let len = items.len() as u32;
    (Box::into_raw(items.into_boxed_slice()) as *mut T, len)
}

/// Take back a slice leaked by `leak_slice`.
///
/// # Safety
/// `(data, len)` must come from `leak_slice` and not have been reclaimed.
unsafe fn reclaim_slice<T>(data: *mut T, len: u32) -> Option<Box<[T]>> {
    if data.is_null() {
        return None;
    }
    let slice = ptr::slice_from_raw_parts_mut(data, len as usize);
    Some(unsafe { Box::from_raw(slice) })
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Error codes carried by `FfiResponse` and `FfiDocument`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    InvalidUrl = 1,
    /// Resolution, connection, handshake or socket failure.
    Transport = 2,
    Timeout = 3,
    Credentials = 4,
    /// The body is not valid in its declared charset, or the charset is
    /// unknown.
    Decode = 5,
    /// The response has no textual body to render.
    NoDocument = 6,
    Panic = 7,
    NullArg = 8,
}

impl From<&FetchError> for FfiErrorCode {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::InvalidUrl { .. } => FfiErrorCode::InvalidUrl,
            FetchError::Timeout(_) => FfiErrorCode::Timeout,
            FetchError::Credentials { .. } => FfiErrorCode::Credentials,
            FetchError::Resolve { .. }
            | FetchError::Connect { .. }
            | FetchError::Handshake { .. }
            | FetchError::Tls(_)
            | FetchError::Io(_) => FfiErrorCode::Transport,
        }
    }
}

/// Status class as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatusClass {
    Unrecognized = 0,
    Input = 1,
    Success = 2,
    Redirect = 3,
    TemporaryFailure = 4,
    PermanentFailure = 5,
    CertRequired = 6,
}

impl From<StatusClass> for FfiStatusClass {
    fn from(class: StatusClass) -> Self {
        match class {
            StatusClass::Input => FfiStatusClass::Input,
            StatusClass::Success => FfiStatusClass::Success,
            StatusClass::Redirect => FfiStatusClass::Redirect,
            StatusClass::TemporaryFailure => FfiStatusClass::TemporaryFailure,
            StatusClass::PermanentFailure => FfiStatusClass::PermanentFailure,
            StatusClass::CertRequired => FfiStatusClass::CertRequired,
            StatusClass::Unrecognized => FfiStatusClass::Unrecognized,
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Outcome of `gemini_fetch`.
///
/// On success `error_code` is `Ok`, `error_message` is null and the
/// remaining fields describe the response. The body is raw bytes, not a C
/// string: it may be binary and is not NUL-terminated; `has_body`
/// distinguishes "no body" from an empty one.
/// On failure only `error_code` and `error_message` are set.
#[repr(C)]
pub struct FfiResponse {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub url: *mut c_char,
    pub status: *mut c_char,
    pub class: FfiStatusClass,
    pub meta: *mut c_char,
    pub has_body: bool,
    pub body: *mut u8,
    pub body_len: usize,
}

impl FfiResponse {
    pub(crate) fn from_core(resp: Response) -> *mut Self {
        let url = c_string(resp.url());
        let status = c_string(resp.status());
        let meta = c_string(resp.meta());
        let class = resp.class().into();

        let (has_body, body, body_len) = match resp.into_body() {
            Some(bytes) => {
                let len = bytes.len();
                let data = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
                (true, data, len)
            }
            None => (false, ptr::null_mut(), 0),
        };

        Box::into_raw(Box::new(FfiResponse {
            error_code: FfiErrorCode::Ok,
            error_message: ptr::null_mut(),
            url,
            status,
            class,
            meta,
            has_body,
            body,
            body_len,
        }))
    }

    pub(crate) fn error(code: FfiErrorCode, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiResponse {
            error_code: code,
            error_message: c_string(msg),
            url: ptr::null_mut(),
            status: ptr::null_mut(),
            class: FfiStatusClass::Unrecognized,
            meta: ptr::null_mut(),
            has_body: false,
            body: ptr::null_mut(),
            body_len: 0,
        }))
    }

    pub(crate) fn from_error(err: &FetchError) -> *mut Self {
        Self::error(err.into(), &err.to_string())
    }

    /// Rebuild the core response this was made from. `None` for an error
    /// envelope.
    ///
    /// # Safety
    /// The string and body fields must be as produced by `from_core`.
    pub(crate) unsafe fn to_core(&self) -> Option<Response> {
        if self.error_code != FfiErrorCode::Ok {
            return None;
        }
        let url = unsafe { read_str(self.url) }?;
        let status = unsafe { read_str(self.status) }?;
        let meta = unsafe { read_str(self.meta) }.unwrap_or_default();
        let body = if self.has_body && !self.body.is_null() {
            Some(unsafe { std::slice::from_raw_parts(self.body, self.body_len) }.to_vec())
        } else if self.has_body {
            Some(Vec::new())
        } else {
            None
        };
        Some(Response::new(url, status, meta, body))
    }

    /// # Safety
    /// `this` must come from `from_core`/`error` and not have been freed.
    pub(crate) unsafe fn free(this: *mut Self) {
        let resp = unsafe { Box::from_raw(this) };
        unsafe {
            free_c_string(resp.error_message);
            free_c_string(resp.url);
            free_c_string(resp.status);
            free_c_string(resp.meta);
        }
        if !resp.body.is_null() {
            let slice = ptr::slice_from_raw_parts_mut(resp.body, resp.body_len);
            drop(unsafe { Box::from_raw(slice) });
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One link of a parsed document.
#[repr(C)]
pub struct FfiLink {
    pub target: *mut c_char,
    pub label: *mut c_char,
}

/// Display lines and links, from `gemini_parse` or `gemini_render`.
///
/// Arrays are null when empty. On failure only `error_code` and
/// `error_message` are set.
#[repr(C)]
pub struct FfiDocument {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub lines: *mut *mut c_char,
    pub lines_len: u32,
    pub links: *mut FfiLink,
    pub links_len: u32,
}

impl FfiDocument {
    pub(crate) fn from_core(doc: Document) -> *mut Self {
        let (lines, lines_len) = leak_slice(doc.lines.into_iter().map(c_string).collect());
        let (links, links_len) = leak_slice(
            doc.links
                .into_iter()
                .map(|link| FfiLink {
                    target: c_string(link.target),
                    label: c_string(link.label),
                })
                .collect(),
        );

        Box::into_raw(Box::new(FfiDocument {
            error_code: FfiErrorCode::Ok,
            error_message: ptr::null_mut(),
            lines,
            lines_len,
            links,
            links_len,
        }))
    }

    pub(crate) fn error(code: FfiErrorCode, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiDocument {
            error_code: code,
            error_message: c_string(msg),
            lines: ptr::null_mut(),
            lines_len: 0,
            links: ptr::null_mut(),
            links_len: 0,
        }))
    }

    pub(crate) fn from_decode_error(err: &DecodeError) -> *mut Self {
        Self::error(FfiErrorCode::Decode, &err.to_string())
    }

    /// # Safety
    /// `this` must come from `from_core`/`error` and not have been freed.
    pub(crate) unsafe fn free(this: *mut Self) {
        let doc = unsafe { Box::from_raw(this) };
        unsafe { free_c_string(doc.error_message) };

        if let Some(lines) = unsafe { reclaim_slice(doc.lines, doc.lines_len) } {
            for &line in lines.iter() {
                unsafe { free_c_string(line) };
            }
        }
        if let Some(links) = unsafe { reclaim_slice(doc.links, doc.links_len) } {
            for link in links.iter() {
                unsafe {
                    free_c_string(link.target);
                    free_c_string(link.label);
                }
            }
        }
    }
}
