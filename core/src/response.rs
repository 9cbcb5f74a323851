//! The response model: status, meta and optional body of one exchange.
//!
//! # Design
//! The two-digit status is classified once, at construction, into a closed
//! `StatusClass`; everything downstream matches on the class instead of
//! re-inspecting the string. `Response` fields are private so the
//! body-only-on-success invariant cannot be broken after construction.

use std::borrow::Cow;

use encoding_rs::Encoding;
use serde::Serialize;

use crate::error::DecodeError;
use crate::gemtext::{self, Document, RenderOptions};

/// Media type of the protocol's own structured text.
pub const GEMTEXT_MIME: &str = "text/gemini";

const DEFAULT_CHARSET: &str = "utf-8";

/// The protocol's status taxonomy, keyed on the first status digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusClass {
    /// `1x`: meta is a prompt; resend the URL with the answer as query.
    Input,
    /// `2x`: meta is the media type of the body.
    Success,
    /// `3x`: meta is the new target.
    Redirect,
    /// `4x`
    TemporaryFailure,
    /// `5x`
    PermanentFailure,
    /// `6x`: a client certificate is needed.
    CertRequired,
    Unrecognized,
}

impl StatusClass {
    pub fn from_code(code: &str) -> Self {
        match code.as_bytes().first() {
            Some(b'1') => StatusClass::Input,
            Some(b'2') => StatusClass::Success,
            Some(b'3') => StatusClass::Redirect,
            Some(b'4') => StatusClass::TemporaryFailure,
            Some(b'5') => StatusClass::PermanentFailure,
            Some(b'6') => StatusClass::CertRequired,
            _ => StatusClass::Unrecognized,
        }
    }
}

/// Outcome of one completed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    url: String,
    status: String,
    class: StatusClass,
    meta: String,
    body: Option<Vec<u8>>,
}

impl Response {
    /// Build a response. A body passed alongside a non-success status is
    /// dropped.
    pub fn new(
        url: impl Into<String>,
        status: impl Into<String>,
        meta: impl Into<String>,
        body: Option<Vec<u8>>,
    ) -> Self {
        let status = status.into();
        let class = StatusClass::from_code(&status);
        let body = if class == StatusClass::Success { body } else { None };
        Self {
            url: url.into(),
            status,
            class,
            meta: meta.into(),
            body,
        }
    }

    /// The URL that produced this response, after any redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Two-digit status code as sent by the server (or synthesized).
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn class(&self) -> StatusClass {
        self.class
    }

    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn into_body(self) -> Option<Vec<u8>> {
        self.body
    }

    /// Body length in bytes, zero when there is no body.
    pub fn len(&self) -> usize {
        self.body.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Media type parsed from meta. Only meaningful for `Success`.
    pub fn media_type(&self) -> MediaType {
        MediaType::parse(&self.meta)
    }

    /// Decode the body using the charset named in meta (UTF-8 if absent).
    ///
    /// Decoding is strict: bytes that are invalid in the declared charset
    /// fail rather than being replaced.
    pub fn decode_body(&self) -> Result<String, DecodeError> {
        let body = self.body.as_deref().ok_or(DecodeError::NoBody)?;
        let media_type = self.media_type();
        if !media_type.is_text() {
            return Err(DecodeError::NotText {
                meta: self.meta.clone(),
            });
        }
        decode(body, media_type.charset().unwrap_or(DEFAULT_CHARSET))
    }

    /// Render a textual body with the default options.
    pub fn render(&self) -> Result<Option<Document>, DecodeError> {
        self.render_with(&RenderOptions::default())
    }

    /// Render a textual body. Gemtext is parsed, other `text/*` types pass
    /// through line by line, anything else (or no body) yields `None`.
    pub fn render_with(&self, options: &RenderOptions) -> Result<Option<Document>, DecodeError> {
        if self.body.is_none() || !self.media_type().is_text() {
            return Ok(None);
        }
        let text = self.decode_body()?;
        if self.media_type().is_gemtext() {
            Ok(Some(gemtext::parse_with(&self.url, &text, options)))
        } else {
            Ok(Some(Document::plain(&text)))
        }
    }
}

/// Labels for 7-bit ASCII. WHATWG maps these to windows-1252, which would
/// accept every high byte.
const ASCII_LABELS: &[&str] = &["ascii", "us-ascii", "ansi_x3.4-1968", "iso646-us", "csascii", "us"];

/// Labels for ISO-8859-1, decoded as true Latin-1 rather than windows-1252.
const LATIN1_LABELS: &[&str] = &[
    "iso-8859-1",
    "iso8859-1",
    "iso88591",
    "iso_8859-1",
    "iso_8859-1:1987",
    "latin1",
    "l1",
    "cp819",
    "ibm819",
    "iso-ir-100",
    "csisolatin1",
];

fn decode(body: &[u8], charset: &str) -> Result<String, DecodeError> {
    let label = charset.trim().to_ascii_lowercase();
    if ASCII_LABELS.contains(&label.as_str()) {
        if !body.is_ascii() {
            return Err(DecodeError::Malformed {
                charset: "US-ASCII".to_string(),
            });
        }
        return Ok(encoding_rs::mem::decode_latin1(body).into_owned());
    }
    if LATIN1_LABELS.contains(&label.as_str()) {
        return Ok(encoding_rs::mem::decode_latin1(body).into_owned());
    }

    let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| DecodeError::UnknownCharset {
        charset: charset.to_string(),
    })?;
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(Cow::into_owned)
        .ok_or_else(|| DecodeError::Malformed {
            charset: encoding.name().to_string(),
        })
}

/// A MIME media type with its parameters, as found in a success meta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaType {
    /// `type/subtype`, lowercased.
    pub essence: String,
    /// Parameters in order of appearance; names are lowercased.
    pub params: Vec<(String, String)>,
}

impl MediaType {
    /// Parse `type/subtype; name=value; name="quoted value"`.
    ///
    /// Lenient: malformed parameters are skipped rather than rejected.
    pub fn parse(meta: &str) -> Self {
        let mut parts = split_params(meta).into_iter();
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

        let params = parts
            .filter_map(|part| {
                let (name, value) = part.split_once('=')?;
                let name = name.trim().to_ascii_lowercase();
                if name.is_empty() {
                    return None;
                }
                Some((name, unquote(value.trim())))
            })
            .collect();

        Self { essence, params }
    }

    /// Value of the first parameter called `name` (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    pub fn is_text(&self) -> bool {
        self.essence.starts_with("text/")
    }

    pub fn is_gemtext(&self) -> bool {
        self.essence == GEMTEXT_MIME
    }
}

/// Split on `;` outside double quotes.
fn split_params(meta: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in meta.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(&meta[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&meta[start..]);
    parts
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}
