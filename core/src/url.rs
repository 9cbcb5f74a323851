//! Reference resolution for gemini URLs.
//!
//! # Design
//! The `url` crate follows WHATWG rules, under which `gemini` is a
//! non-special scheme and relative references do not merge the way they do
//! for `http`. Resolution therefore swaps the base's scheme for `http`,
//! lets the crate do the standard merge and dot-segment removal, then swaps
//! the scheme back.

use url::Url;

/// The protocol's own scheme.
pub const SCHEME: &str = "gemini";

/// Port used when a URL does not name one.
pub const DEFAULT_PORT: u16 = 1965;

const SCHEME_PREFIX: &str = "gemini://";
const STAND_IN_PREFIX: &str = "http://";

/// A reference carrying a scheme separator is already absolute.
pub fn is_absolute(reference: &str) -> bool {
    reference.contains("://")
}

/// The scheme named before `://`, lowercased. Read from the text alone so
/// that URLs the parser would reject still have a scheme.
pub fn scheme_of(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once("://")?;
    Some(scheme.trim().to_ascii_lowercase())
}

/// Prefix `gemini://` onto a bare `host/path` reference.
pub fn with_default_scheme(url: &str) -> String {
    if is_absolute(url) {
        url.to_string()
    } else {
        format!("{SCHEME_PREFIX}{url}")
    }
}

/// Resolve `relative` against `base`.
///
/// An empty reference strips the query from `base` instead of naming the
/// same document: capsules rely on this to clear an input query. Never
/// fails; a base the resolver cannot parse yields `relative` unchanged.
pub fn resolve(base: &str, relative: &str) -> String {
    if is_absolute(relative) {
        return relative.to_string();
    }
    if relative.is_empty() {
        return match base.split_once('?') {
            Some((without_query, _)) => without_query.to_string(),
            None => base.to_string(),
        };
    }

    let swapped = has_gemini_prefix(base);
    let stand_in = if swapped {
        format!("{STAND_IN_PREFIX}{}", &base[SCHEME_PREFIX.len()..])
    } else {
        base.to_string()
    };

    let joined = match Url::parse(&stand_in).and_then(|b| b.join(relative)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            log::debug!("cannot resolve '{relative}' against '{base}': {e}");
            return relative.to_string();
        }
    };

    match joined.strip_prefix(STAND_IN_PREFIX) {
        Some(rest) if swapped => format!("{SCHEME_PREFIX}{rest}"),
        _ => joined,
    }
}

fn has_gemini_prefix(url: &str) -> bool {
    url.get(..SCHEME_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SCHEME_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_references_are_untouched() {
        for r in ["gemini://other/x", "https://example.com/a?b", "gopher://h:70/1/"] {
            assert_eq!(resolve("gemini://h/p", r), r);
        }
    }

    #[test]
    fn empty_reference_strips_query() {
        assert_eq!(resolve("gemini://h/p?q=1", ""), "gemini://h/p");
        assert_eq!(resolve("gemini://h/p", ""), "gemini://h/p");
    }

    #[test]
    fn absolute_path() {
        assert_eq!(resolve("gemini://h/", "/a"), "gemini://h/a");
        assert_eq!(resolve("gemini://h/x/y", "/a"), "gemini://h/a");
    }

    #[test]
    fn relative_path_merges_with_base_directory() {
        assert_eq!(resolve("gemini://h/a/b", "c"), "gemini://h/a/c");
        assert_eq!(resolve("gemini://h/a/b/", "c"), "gemini://h/a/b/c");
    }

    #[test]
    fn dot_segments_are_removed() {
        assert_eq!(resolve("gemini://h/a/b/c", "../d"), "gemini://h/a/d");
        assert_eq!(resolve("gemini://h/a/b/c", "./d"), "gemini://h/a/b/d");
    }

    #[test]
    fn port_and_query_survive() {
        assert_eq!(resolve("gemini://h:1966/a/", "b?x=1"), "gemini://h:1966/a/b?x=1");
        assert_eq!(resolve("gemini://h/p?q", "?x"), "gemini://h/p?x");
    }

    #[test]
    fn network_path_reference_keeps_gemini_scheme() {
        assert_eq!(resolve("gemini://h/p", "//other/q"), "gemini://other/q");
    }

    #[test]
    fn bare_host_base() {
        assert_eq!(resolve("gemini://h", "a"), "gemini://h/a");
    }

    #[test]
    fn unparsable_base_is_total() {
        assert_eq!(resolve("not a url", "x"), "x");
    }

    #[test]
    fn scheme_is_read_from_text() {
        assert_eq!(scheme_of("GEMINI://h/").as_deref(), Some("gemini"));
        assert_eq!(scheme_of("https://exa mple.com/").as_deref(), Some("https"));
        assert_eq!(scheme_of("h/p"), None);
    }

    #[test]
    fn default_scheme_is_prefixed_once() {
        assert_eq!(with_default_scheme("h/p"), "gemini://h/p");
        assert_eq!(with_default_scheme("gemini://h/p"), "gemini://h/p");
        assert_eq!(with_default_scheme("https://h/p"), "https://h/p");
    }
}
