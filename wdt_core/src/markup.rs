//! Shared helpers for working directly on OOXML markup text.
//!
//! The engine never builds a document object model. It locates the handful
//! of structural elements it needs (paragraphs, runs, text nodes, tables,
//! rows) with regexes and nesting-aware span scans, and rewrites the raw
//! text. Anything it does not touch passes through byte-identical.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// A whole paragraph element, including its open-tag attributes.
/// `<w:p\b` does not match `<w:pPr` because there is no word boundary
/// between `p` and `P`.
pub static PARAGRAPH_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<w:p\b[^>]*>.*?</w:p>").expect("valid regex"));

/// A whole run element inside a paragraph.
pub static RUN_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<w:r\b[^>]*>.*?</w:r>").expect("valid regex"));

/// A text node inside a run. Group 1 is the (already XML-escaped) content.
pub static TEXT_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<w:t\b[^>]*>(.*?)</w:t>").expect("valid regex"));

/// Paragraph-level formatting properties.
pub static PPR_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<w:pPr\b[^>]*>.*?</w:pPr>|<w:pPr\s*/>").expect("valid regex"));

/// Run-level (character) formatting properties.
pub static RPR_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<w:rPr\b[^>]*>.*?</w:rPr>|<w:rPr\s*/>").expect("valid regex"));

/// Any markup tag, used when collapsing a span down to its plain text.
static ANY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Escape raw text for placement inside a markup text node.
pub fn escape_xml(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for ch in text.chars() {
		match ch {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&apos;"),
			_ => escaped.push(ch),
		}
	}
	escaped
}

/// Remove every tag from a span of markup, leaving only its text content.
pub fn strip_tags(markup: &str) -> String {
	ANY_TAG_RE.replace_all(markup, "").into_owned()
}

/// Concatenated text-node content of a span of markup, in order.
pub fn text_content(markup: &str) -> String {
	let mut content = String::new();
	for capture in TEXT_RE.captures_iter(markup) {
		content.push_str(&capture[1]);
	}
	content
}

/// Whether the byte at `pos` starts an opening tag for `name`, checking
/// that `name` is not merely a prefix of a longer element name (so `w:tbl`
/// does not match `<w:tblPr>` and `w:trPr` does not match `<w:trPrChange>`).
fn is_open_tag_at(text: &str, pos: usize, name: &str) -> bool {
	let rest = &text[pos..];
	let Some(after) = rest.strip_prefix('<').and_then(|r| r.strip_prefix(name)) else {
		return false;
	};
	matches!(
		after.as_bytes().first(),
		Some(b'>' | b' ' | b'\t' | b'\r' | b'\n' | b'/')
	)
}

/// Find the end of the tag that starts at `pos`, and whether it was
/// self-closing. Returns the offset one past the closing `>`.
fn tag_end(text: &str, pos: usize) -> Option<(usize, bool)> {
	let close = text[pos..].find('>')? + pos;
	let self_closing = text[..close].ends_with('/');
	Some((close + 1, self_closing))
}

/// Locate the first opening tag for `name` in `text`. Returns the byte
/// range of the tag itself and whether it is self-closing.
pub(crate) fn find_open_tag(text: &str, name: &str) -> Option<(Range<usize>, bool)> {
	let needle = format!("<{name}");
	let mut from = 0;
	while let Some(pos) = text[from..].find(&needle).map(|i| i + from) {
		if is_open_tag_at(text, pos, name) {
			let (end, self_closing) = tag_end(text, pos)?;
			return Some((pos..end, self_closing));
		}
		from = pos + 1;
	}
	None
}

/// Byte ranges of all top-level `<name>…</name>` elements in `text`, in
/// document order. Nested occurrences of the same element (tables inside
/// table cells, rows of nested tables) are contained within the returned
/// spans, not reported separately.
pub fn element_spans(text: &str, name: &str) -> Vec<Range<usize>> {
	let open_needle = format!("<{name}");
	let close_needle = format!("</{name}>");
	let mut spans = Vec::new();
	let mut depth = 0usize;
	let mut start = 0usize;
	let mut cursor = 0usize;

	while cursor < text.len() {
		let Some(next_lt) = text[cursor..].find('<').map(|i| i + cursor) else {
			break;
		};

		if text[next_lt..].starts_with(&close_needle) {
			let end = next_lt + close_needle.len();
			if depth > 0 {
				depth -= 1;
				if depth == 0 {
					spans.push(start..end);
				}
			}
			cursor = end;
			continue;
		}

		if text[next_lt..].starts_with(&open_needle) && is_open_tag_at(text, next_lt, name) {
			let Some((end, self_closing)) = tag_end(text, next_lt) else {
				break;
			};
			if self_closing {
				if depth == 0 {
					spans.push(next_lt..end);
				}
			} else {
				if depth == 0 {
					start = next_lt;
				}
				depth += 1;
			}
			cursor = end;
			continue;
		}

		cursor = next_lt + 1;
	}

	spans
}
