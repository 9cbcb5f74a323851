//! Request and header framing.
//!
//! These functions never touch a socket; `session` feeds them the bytes.

/// Longest header line accepted: two status digits, a space, 1024 bytes of
/// meta and CRLF.
pub const MAX_HEADER_LEN: usize = 1029;

/// A well-formed response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Exactly two ASCII digits.
    pub status: String,
    /// Free text after the status; empty when the server sent none.
    pub meta: String,
}

/// The whole request: the absolute URL followed by CRLF.
pub fn build_request(url: &str) -> Vec<u8> {
    let mut request = Vec::with_capacity(url.len() + 2);
    request.extend_from_slice(url.as_bytes());
    request.extend_from_slice(b"\r\n");
    request
}

/// Parse one raw header line (terminator included or not).
///
/// On failure returns a diagnostic naming the offending status token,
/// suitable as the meta of a synthetic `40` response.
pub fn parse_header(raw: &[u8]) -> Result<Header, String> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(_) => {
            return Err(format!(
                "Bad header '{}': not UTF-8",
                String::from_utf8_lossy(raw).trim()
            ))
        }
    };
    let line = line.trim();

    let (status, meta) = match line.split_once(char::is_whitespace) {
        Some((status, meta)) => (status, meta.trim_start()),
        None => (line, ""),
    };

    if status.len() != 2 || !status.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("Bad header '{status}'"));
    }

    Ok(Header {
        status: status.to_string(),
        meta: meta.to_string(),
    })
}
