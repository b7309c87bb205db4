//! Repair of placeholders the authoring tool split across markup runs.
//!
//! Editors freely break typed text into multiple `<w:r>` runs (spell-check
//! state, formatting toggles, revision tracking), so one `${user.name}`
//! may arrive as `${user.` in one run and `name}` in the next. Block and
//! expression processing assume placeholders are contiguous, so this pass
//! runs first.

use crate::markup;

/// Run both repair passes over a markup part.
pub fn repair(markup_text: &str) -> String {
	let merged = merge_split_runs(markup_text);
	collapse_spanning_expressions(&merged)
}

/// First pass: for each paragraph, concatenate its run texts in order. If a
/// `${` opened in one run is still unclosed at a run boundary, the whole
/// paragraph is rebuilt as a single run carrying the concatenated text,
/// keeping the paragraph's block formatting and the first run's character
/// formatting. Paragraphs without a detected split are left byte-identical.
fn merge_split_runs(markup_text: &str) -> String {
	markup::PARAGRAPH_RE
		.replace_all(markup_text, |caps: &regex::Captures<'_>| {
			let paragraph = &caps[0];
			rebuild_if_split(paragraph).unwrap_or_else(|| paragraph.to_string())
		})
		.into_owned()
}

fn rebuild_if_split(paragraph: &str) -> Option<String> {
	let runs: Vec<&str> = markup::RUN_RE
		.find_iter(paragraph)
		.map(|m| m.as_str())
		.collect();
	if runs.len() < 2 {
		return None;
	}

	let texts: Vec<String> = runs.iter().map(|run| markup::text_content(run)).collect();
	if !has_split_placeholder(&texts) {
		return None;
	}

	let open_end = paragraph.find('>')? + 1;
	let open_tag = &paragraph[..open_end];
	let block_props = markup::PPR_RE
		.find(paragraph)
		.map(|m| m.as_str())
		.unwrap_or_default();
	// Character formatting comes from the first run; the merged text can
	// only carry one set of run properties.
	let run_props = markup::RPR_RE
		.find(runs[0])
		.map(|m| m.as_str())
		.unwrap_or_default();
	let text = texts.concat();

	Some(format!(
		"{open_tag}{block_props}<w:r>{run_props}<w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>"
	))
}

/// Whether a `${` opened in one run closes in a later run. An expression
/// left unclosed at the end of the *last* run is not a split, just an
/// unclosed placeholder for later layers to warn about.
fn has_split_placeholder(texts: &[String]) -> bool {
	let mut depth = 0usize;

	for (i, text) in texts.iter().enumerate() {
		let mut chars = text.chars().peekable();
		while let Some(ch) = chars.next() {
			if ch == '$' && chars.peek() == Some(&'{') {
				chars.next();
				depth += 1;
			} else if ch == '}' && depth > 0 {
				depth -= 1;
			}
		}
		if depth > 0 && i + 1 < texts.len() {
			return true;
		}
	}

	false
}

/// Second pass: any expression that still spans markup tags (placeholders
/// split across paragraph-internal structures the first pass cannot merge)
/// is replaced by its tag-stripped plain text. Spans reaching past a
/// paragraph boundary are never placeholders and are left alone.
fn collapse_spanning_expressions(markup_text: &str) -> String {
	let mut out = String::with_capacity(markup_text.len());
	let mut cursor = 0usize;

	while let Some(open) = markup_text[cursor..].find("${").map(|i| i + cursor) {
		let Some(close) = markup_text[open..].find('}').map(|i| i + open) else {
			break;
		};

		out.push_str(&markup_text[cursor..open]);
		let span = &markup_text[open..=close];
		if span.contains('<') && !span.contains("</w:p>") {
			out.push_str(&markup::strip_tags(span));
		} else {
			out.push_str(span);
		}
		cursor = close + 1;
	}

	out.push_str(&markup_text[cursor..]);
	out
}
