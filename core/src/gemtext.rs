//! Parser for `text/gemini` bodies.
//!
//! # Design
//! A single left-to-right fold over the body's lines. The only state carried
//! between lines is whether we are inside a preformatted block; it travels
//! in `ParseState` rather than in captured variables so each step is a pure
//! function of (state, line).
//!
//! Link order is source order and links are never deduplicated: consumers
//! address them by index ("follow link 3").

use serde::Serialize;

use crate::url::resolve;

/// Prefix of a link line.
pub const LINK_MARKER: &str = "=>";

/// Prefix of a line that opens or closes a preformatted block.
pub const FENCE_MARKER: &str = "```";

/// Column width used when wrapping.
pub const WRAP_WIDTH: usize = 80;

/// A followable reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Absolute URL, resolved against the document's own URL.
    pub target: String,
    pub label: String,
}

/// Display lines plus the links found while producing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    pub lines: Vec<String>,
    pub links: Vec<Link>,
}

impl Document {
    /// A non-gemtext text body: its lines as-is, no links.
    pub fn plain(text: &str) -> Self {
        Self {
            lines: lines(text).map(str::to_string).collect(),
            links: Vec::new(),
        }
    }

    /// The rendered lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Knobs for the render path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub width: usize,
    /// Wrap ordinary text lines too, not only link lines.
    pub wrap_text: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: WRAP_WIDTH,
            wrap_text: false,
        }
    }
}

/// Parse `text` with the default options. Relative link targets are
/// resolved against `base`.
pub fn parse(base: &str, text: &str) -> Document {
    parse_with(base, text, &RenderOptions::default())
}

pub fn parse_with(base: &str, text: &str, options: &RenderOptions) -> Document {
    lines(text)
        .fold(ParseState::default(), |state, line| state.step(base, line, options))
        .doc
}

#[derive(Default)]
struct ParseState {
    preformatted: bool,
    doc: Document,
}

impl ParseState {
    fn step(mut self, base: &str, line: &str, options: &RenderOptions) -> Self {
        if line.starts_with(FENCE_MARKER) {
            self.preformatted = !self.preformatted;
            return self;
        }
        if self.preformatted {
            self.doc.lines.push(line.to_string());
            return self;
        }

        if let Some((target, label)) = split_link(line) {
            self.doc.links.push(Link {
                target: resolve(base, target),
                label: label.to_string(),
            });
            self.doc.lines.extend(wrap(line, options.width));
        } else if options.wrap_text && !line.trim().is_empty() {
            self.doc.lines.extend(wrap(line, options.width));
        } else if options.wrap_text {
            self.doc.lines.push(String::new());
        } else {
            self.doc.lines.push(line.to_string());
        }
        self
    }
}

/// Split `text` at `\r\n`, `\n` or a lone `\r`. Like `str::lines`, a
/// trailing terminator does not produce a final empty line.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(end) = rest.find(['\r', '\n']) else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..end];
        let terminator = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + terminator..];
        Some(line)
    })
}

/// Split a link line into its target and label. The label falls back to the
/// target. Returns `None` for lines that are not links, including a bare
/// marker followed only by whitespace.
fn split_link(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(LINK_MARKER)?.trim();
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(char::is_whitespace) {
        Some((target, label)) => Some((target, label.trim_start())),
        None => Some((rest, rest)),
    }
}

/// Greedy word wrap at `width` columns.
///
/// Whitespace runs collapse to a single space and words longer than the
/// width are split. A blank line wraps to nothing.
pub fn wrap(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in line.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while !chars.is_empty() {
            let gap = usize::from(current_len > 0);
            let room = width.saturating_sub(current_len + gap);
            if chars.len() <= room {
                if gap == 1 {
                    current.push(' ');
                }
                current_len += gap + chars.len();
                current.extend(chars.drain(..));
            } else if current_len > 0 && (chars.len() <= width || room == 0) {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            } else {
                // Longer than a whole line: fill what is left and carry on.
                if gap == 1 {
                    current.push(' ');
                }
                current.extend(chars.drain(..room));
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
        }
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "gemini://h/";

    #[test]
    fn heading_link_and_preformatted_block() {
        let doc = parse(BASE, "# Title\n=> /a Link A\n```\nraw=>not a link\n```\nplain");
        assert_eq!(
            doc.links,
            vec![Link {
                target: "gemini://h/a".to_string(),
                label: "Link A".to_string(),
            }]
        );
        assert_eq!(doc.lines, vec!["# Title", "=> /a Link A", "raw=>not a link", "plain"]);
    }

    #[test]
    fn links_keep_source_order() {
        let doc = parse(BASE, "=> /a A\n=> /b B\n=> /a A");
        let labels: Vec<&str> = doc.links.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "A"]);
        assert_eq!(doc.links[1].target, "gemini://h/b");
    }

    #[test]
    fn label_defaults_to_target() {
        let doc = parse(BASE, "=>   other.gmi");
        assert_eq!(doc.links[0].target, "gemini://h/other.gmi");
        assert_eq!(doc.links[0].label, "other.gmi");
    }

    #[test]
    fn label_keeps_inner_whitespace() {
        let doc = parse(BASE, "=> /x   two  words ");
        assert_eq!(doc.links[0].label, "two  words");
    }

    #[test]
    fn marker_with_only_whitespace_is_ordinary_text() {
        let doc = parse(BASE, "=>   \n=>");
        assert!(doc.links.is_empty());
        assert_eq!(doc.lines, vec!["=>   ", "=>"]);
    }

    #[test]
    fn unterminated_block_swallows_the_rest() {
        let doc = parse(BASE, "=> /a A\n```\n=> /b B\n# not a heading");
        assert_eq!(doc.links.len(), 1);
        assert_eq!(doc.lines, vec!["=> /a A", "=> /b B", "# not a heading"]);
    }

    #[test]
    fn fence_with_alt_text_toggles() {
        let doc = parse(BASE, "```rust\nfn main() {}\n```\n=> /a");
        assert_eq!(doc.lines, vec!["fn main() {}", "=> /a"]);
        assert_eq!(doc.links.len(), 1);
    }

    #[test]
    fn absolute_targets_are_kept() {
        let doc = parse(BASE, "=> https://example.com/ The web");
        assert_eq!(doc.links[0].target, "https://example.com/");
    }

    #[test]
    fn long_link_lines_are_wrapped() {
        let label = "word ".repeat(30);
        let doc = parse(BASE, &format!("=> /a {label}"));
        assert_eq!(doc.links.len(), 1);
        assert!(doc.lines.len() > 1);
        assert!(doc.lines.iter().all(|l| l.chars().count() <= WRAP_WIDTH));
    }

    #[test]
    fn text_lines_are_not_wrapped_by_default() {
        let long = "x ".repeat(100);
        let doc = parse(BASE, &long);
        assert_eq!(doc.lines, vec![long]);
    }

    #[test]
    fn wrap_text_variant_wraps_and_keeps_blank_lines() {
        let options = RenderOptions {
            width: 10,
            wrap_text: true,
        };
        let doc = parse_with(BASE, "aaa bbb ccc ddd\n\nshort", &options);
        assert_eq!(doc.lines, vec!["aaa bbb", "ccc ddd", "", "short"]);
    }

    #[test]
    fn text_joins_with_newlines() {
        let doc = parse(BASE, "one\ntwo");
        assert_eq!(doc.text(), "one\ntwo");
    }

    #[test]
    fn crlf_bodies() {
        let doc = parse(BASE, "=> /a A\r\nplain\r\n");
        assert_eq!(doc.lines, vec!["=> /a A", "plain"]);
        assert_eq!(doc.links[0].label, "A");
    }

    #[test]
    fn lone_carriage_returns_end_lines() {
        let doc = parse(BASE, "# Old Mac\r=> /a A\r=> /b B\r");
        assert_eq!(doc.lines, vec!["# Old Mac", "=> /a A", "=> /b B"]);
        assert_eq!(doc.links.len(), 2);
        assert_eq!(doc.links[1].target, "gemini://h/b");
    }

    #[test]
    fn line_splitting_matches_lines_for_lf_and_crlf() {
        for text in ["a\n\nb", "a\r\nb\r\n", "a\n", "", "\n", "a\r\n\r\nb"] {
            assert_eq!(lines(text).collect::<Vec<_>>(), text.lines().collect::<Vec<_>>(), "{text:?}");
        }
        assert_eq!(lines("a\r\rb").collect::<Vec<_>>(), vec!["a", "", "b"]);
    }

    #[test]
    fn wrap_greedy() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("  spaced   out  ", 80), vec!["spaced out"]);
        assert!(wrap("   ", 80).is_empty());
    }

    #[test]
    fn wrap_splits_long_words() {
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("ab cdefgh", 4), vec!["ab c", "defg", "h"]);
    }

    #[test]
    fn plain_document_has_no_links() {
        let doc = Document::plain("=> /a A\nline");
        assert!(doc.links.is_empty());
        assert_eq!(doc.lines, vec!["=> /a A", "line"]);
    }
}
