//! The template processor: repair, recursive block expansion, and leaf
//! expression substitution for one markup part.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::WdtError;
use crate::WdtResult;
use crate::expression;
use crate::expression::Condition;
use crate::expression::Expr;
use crate::formatters::FormatterRegistry;
use crate::formatters::display_value;
use crate::lexer::scan_tags;
use crate::markup;
use crate::repair;
use crate::scope::LoopMeta;
use crate::scope::ScopeManager;

/// Upper bound on block-expansion iterations within one part. Malformed or
/// adversarial templates degrade to a terminal warning instead of hanging.
pub const MAX_EXPANSION_PASSES: usize = 256;

/// Upper bound on block nesting depth.
const MAX_BLOCK_DEPTH: usize = 64;

/// The package part holding the main document body.
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// The rewritten markup part plus every warning collected along the way.
/// Template problems never abort a render; they degrade to empty output
/// for the offending expression and land here.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
	pub content: String,
	pub warnings: Vec<String>,
}

/// A placeholder tag with its classified instruction.
#[derive(Debug, Clone)]
struct Tag {
	range: Range<usize>,
	expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
	Each,
	If,
}

impl BlockKind {
	fn open_label(self) -> &'static str {
		match self {
			Self::Each => "#each",
			Self::If => "#if",
		}
	}

	fn close_label(self) -> &'static str {
		match self {
			Self::Each => "/each",
			Self::If => "/if",
		}
	}
}

/// Expands template expressions in markup parts against a data tree.
///
/// The processor owns a handle to the formatter registry and nothing else;
/// every call to [`process`](Self::process) builds fresh per-render state,
/// so one processor may serve concurrent renders.
#[derive(Debug, Clone)]
pub struct TemplateProcessor {
	registry: Arc<FormatterRegistry>,
}

impl Default for TemplateProcessor {
	fn default() -> Self {
		Self::new()
	}
}

impl TemplateProcessor {
	pub fn new() -> Self {
		Self {
			registry: Arc::new(FormatterRegistry::with_builtins()),
		}
	}

	/// Use a caller-extended registry instead of the built-in set.
	pub fn with_registry(registry: Arc<FormatterRegistry>) -> Self {
		Self { registry }
	}

	pub fn registry(&self) -> &FormatterRegistry {
		&self.registry
	}

	/// Process one markup part against a data tree.
	pub fn process(&self, markup_text: &str, data: &Value) -> ProcessOutput {
		let mut warnings = Vec::new();
		let mut scope = ScopeManager::new(data.clone());

		let repaired = repair::repair(markup_text);

		let mut expanded_any = false;
		let mut evaluated: Vec<Range<usize>> = Vec::new();
		let expanded = self.expand_blocks(
			repaired,
			&mut scope,
			&mut warnings,
			0,
			&mut expanded_any,
			&mut evaluated,
		);

		// A loop over an empty array leaves a skeleton row behind; drop
		// rows whose stripped text is empty, but only when expansion
		// actually ran so placeholder-free documents round-trip untouched.
		let cleaned = if expanded_any {
			remove_empty_rows(&expanded, &mut evaluated)
		} else {
			expanded
		};

		let content = self.substitute(&cleaned, &scope, &mut warnings, &evaluated);

		debug!(
			warnings = warnings.len(),
			"processed markup part ({} bytes in, {} bytes out)",
			markup_text.len(),
			content.len()
		);

		ProcessOutput { content, warnings }
	}

	/// Process a set of named markup parts (body, headers, footers) against
	/// one data tree, merging warnings. Each part is rewritten whole.
	pub fn process_parts(
		&self,
		parts: &BTreeMap<String, String>,
		data: &Value,
	) -> (BTreeMap<String, String>, Vec<String>) {
		let mut outputs = BTreeMap::new();
		let mut warnings = Vec::new();

		for (name, text) in parts {
			let output = self.process(text, data);
			for warning in output.warnings {
				warnings.push(format!("{name}: {warning}"));
			}
			outputs.insert(name.clone(), output.content);
		}

		(outputs, warnings)
	}

	/// Expand `#each` and `#if` blocks until none remain (or the pass bound
	/// is hit). Expanded block bodies are fully processed, nested blocks
	/// and leaf expressions both, while their loop scope is on the stack, so
	/// the replacement text needs no further scanning; the cursor skips it
	/// and its byte range is recorded in `evaluated` so later substitution
	/// passes never re-interpret it. Earlier recorded ranges stay valid
	/// because every splice happens at or past the cursor.
	fn expand_blocks(
		&self,
		text: String,
		scope: &mut ScopeManager,
		warnings: &mut Vec<String>,
		depth: usize,
		expanded_any: &mut bool,
		evaluated: &mut Vec<Range<usize>>,
	) -> String {
		if depth >= MAX_BLOCK_DEPTH {
			push_warning(warnings, format!("block nesting exceeds {MAX_BLOCK_DEPTH} levels; leaving inner blocks unexpanded"));
			return text;
		}

		let mut text = text;
		let mut cursor = 0usize;

		for _pass in 0..MAX_EXPANSION_PASSES {
			let tags = parse_tags(&text);
			let Some(open_idx) = tags.iter().position(|tag| {
				tag.range.start >= cursor
					&& matches!(tag.expr, Expr::LoopStart { .. } | Expr::ConditionStart(_))
			}) else {
				return text;
			};

			let kind = match &tags[open_idx].expr {
				Expr::LoopStart { .. } => BlockKind::Each,
				_ => BlockKind::If,
			};

			let Some(close_idx) = find_matching_close(&tags, open_idx, kind, warnings) else {
				push_warning(
					warnings,
					format!(
						"unclosed `${{{}}}` block: no matching `${{{}}}`; leaving tag in place",
						kind.open_label(),
						kind.close_label()
					),
				);
				cursor = tags[open_idx].range.end;
				continue;
			};

			*expanded_any = true;
			let replacement = match tags[open_idx].expr.clone() {
				Expr::LoopStart { path } => {
					let body = &text[tags[open_idx].range.end..tags[close_idx].range.start];
					self.expand_loop(body, &path, scope, warnings, depth)
				}
				Expr::ConditionStart(condition) => self.expand_condition(
					&text,
					&tags,
					open_idx,
					close_idx,
					&condition,
					scope,
					warnings,
					depth,
				),
				_ => String::new(),
			};

			let start = tags[open_idx].range.start;
			let end = tags[close_idx].range.end;
			let mut buffer = String::with_capacity(text.len() - (end - start) + replacement.len());
			buffer.push_str(&text[..start]);
			buffer.push_str(&replacement);
			buffer.push_str(&text[end..]);
			if !replacement.is_empty() {
				evaluated.push(start..start + replacement.len());
			}
			text = buffer;
			cursor = start + replacement.len();
		}

		push_warning(
			warnings,
			format!("block expansion did not settle within {MAX_EXPANSION_PASSES} passes; output may contain unexpanded blocks"),
		);
		text
	}

	/// Expand one `#each` block. Absent loop targets drop silently; present
	/// non-array targets drop with a warning.
	fn expand_loop(
		&self,
		body: &str,
		path: &str,
		scope: &mut ScopeManager,
		warnings: &mut Vec<String>,
		depth: usize,
	) -> String {
		match scope.resolve(path) {
			None => String::new(),
			Some(Value::Array(items)) => {
				let count = items.len();
				let mut out = String::new();
				for (index, item) in items.into_iter().enumerate() {
					scope.push_scope(item, Some(LoopMeta::new(index, count)));
					let mut expanded_any = false;
					let mut evaluated = Vec::new();
					let expanded = self.expand_blocks(
						body.to_string(),
						scope,
						warnings,
						depth + 1,
						&mut expanded_any,
						&mut evaluated,
					);
					out.push_str(&self.substitute(&expanded, scope, warnings, &evaluated));
					scope.pop_scope();
				}
				out
			}
			Some(_) => {
				push_warning(
					warnings,
					format!("loop target `{path}` is not an array; dropping block"),
				);
				String::new()
			}
		}
	}

	/// Expand one `#if` block. The body splits at top-level `#elseif` /
	/// `#else` markers into branches; exactly one branch (the first whose
	/// condition holds, or the `#else` branch) is expanded and kept, the
	/// rest are dropped without evaluation.
	#[allow(clippy::too_many_arguments)]
	fn expand_condition(
		&self,
		text: &str,
		tags: &[Tag],
		open_idx: usize,
		close_idx: usize,
		condition: &Condition,
		scope: &mut ScopeManager,
		warnings: &mut Vec<String>,
		depth: usize,
	) -> String {
		let mut branches: Vec<(Option<Condition>, Range<usize>)> = Vec::new();
		let mut current: Option<Condition> = Some(condition.clone());
		let mut segment_start = tags[open_idx].range.end;
		let mut nested = 0usize;

		for tag in &tags[open_idx + 1..close_idx] {
			match &tag.expr {
				Expr::LoopStart { .. } | Expr::ConditionStart(_) => nested += 1,
				Expr::LoopEnd | Expr::ConditionEnd => nested = nested.saturating_sub(1),
				Expr::ElseIf(next) if nested == 0 => {
					branches.push((current.take(), segment_start..tag.range.start));
					current = Some(next.clone());
					segment_start = tag.range.end;
				}
				Expr::Else if nested == 0 => {
					branches.push((current.take(), segment_start..tag.range.start));
					current = None;
					segment_start = tag.range.end;
				}
				_ => {}
			}
		}
		branches.push((current, segment_start..tags[close_idx].range.start));

		for (branch_condition, range) in branches {
			let chosen = match &branch_condition {
				Some(c) => expression::evaluate_condition(c, scope),
				None => true,
			};
			if chosen {
				let body = text[range].to_string();
				let mut expanded_any = false;
				let mut evaluated = Vec::new();
				let expanded = self.expand_blocks(
					body,
					scope,
					warnings,
					depth + 1,
					&mut expanded_any,
					&mut evaluated,
				);
				return self.substitute(&expanded, scope, warnings, &evaluated);
			}
		}

		String::new()
	}

	/// Substitute every remaining leaf `${...}` expression in a single pass
	/// over the text, producing a fresh buffer. Tags inside `evaluated`
	/// spans arrived through substituted data values; they are content, not
	/// template text, and stay verbatim. Block tags that survive to this
	/// point were already reported as unmatched; they stay in place.
	fn substitute(
		&self,
		text: &str,
		scope: &ScopeManager,
		warnings: &mut Vec<String>,
		evaluated: &[Range<usize>],
	) -> String {
		let tags = parse_tags(text);
		if tags.is_empty() {
			return text.to_string();
		}

		let mut out = String::with_capacity(text.len());
		let mut last = 0usize;

		for tag in &tags {
			out.push_str(&text[last..tag.range.start]);
			if intersects(evaluated, &tag.range) {
				out.push_str(&text[tag.range.clone()]);
				last = tag.range.end;
				continue;
			}
			match &tag.expr {
				Expr::Variable { path, formatters } => {
					if path.is_empty() {
						push_warning(
							warnings,
							format!("malformed expression `{}`", &text[tag.range.clone()]),
						);
					} else {
						out.push_str(&self.evaluate_variable(path, formatters, scope, warnings));
					}
				}
				Expr::LoopEnd | Expr::ConditionEnd | Expr::Else | Expr::ElseIf(_) => {
					push_warning(
						warnings,
						format!("unmatched `{}` tag left in place", &text[tag.range.clone()]),
					);
					out.push_str(&text[tag.range.clone()]);
				}
				Expr::LoopStart { .. } | Expr::ConditionStart(_) => {
					out.push_str(&text[tag.range.clone()]);
				}
			}
			last = tag.range.end;
		}

		out.push_str(&text[last..]);
		out
	}

	/// Resolve a variable path, run its formatter chain, and escape the
	/// result for placement in a text node. Undefined (as opposed to
	/// explicitly null) values additionally warn.
	fn evaluate_variable(
		&self,
		path: &str,
		formatters: &[expression::FormatterCall],
		scope: &ScopeManager,
		warnings: &mut Vec<String>,
	) -> String {
		let resolved = scope.resolve(path);
		if resolved.is_none() {
			push_warning(warnings, format!("undefined variable `{path}`"));
		}

		// Formatters still run on undefined values (as null) so `default`
		// can supply a fallback.
		let mut value = resolved.unwrap_or(Value::Null);
		for call in formatters {
			match self.registry.apply(&call.name, &value, &call.args) {
				Some(next) => value = next,
				None => {
					push_warning(
						warnings,
						format!("unknown formatter `{}`; value passed through", call.name),
					);
				}
			}
		}

		markup::escape_xml(&display_value(&value))
	}
}

/// Fetch the main document part from a loaded package's parts, checking
/// the structural minimum before any template processing starts. Absence
/// or a body-less part is a fatal load error, never a template warning.
pub fn main_document_part(parts: &BTreeMap<String, String>) -> WdtResult<&str> {
	let part = parts
		.get(MAIN_DOCUMENT_PART)
		.ok_or_else(|| WdtError::MissingPart(MAIN_DOCUMENT_PART.to_string()))?;

	if !part.contains("<w:body") {
		return Err(WdtError::MalformedPackage(format!(
			"`{MAIN_DOCUMENT_PART}` has no `<w:body>` element"
		)));
	}

	Ok(part)
}

/// Scan and classify every placeholder in `text`.
fn parse_tags(text: &str) -> Vec<Tag> {
	scan_tags(text)
		.into_iter()
		.map(|raw| {
			Tag {
				expr: expression::parse(&raw.payload),
				range: raw.range,
			}
		})
		.collect()
}

/// Find the closing tag matching the opener at `open_idx` with a typed
/// stack. A close tag of the wrong type for the innermost open block is
/// rejected with an explicit warning instead of silently closing it.
fn find_matching_close(
	tags: &[Tag],
	open_idx: usize,
	kind: BlockKind,
	warnings: &mut Vec<String>,
) -> Option<usize> {
	let mut stack = vec![kind];

	for (idx, tag) in tags.iter().enumerate().skip(open_idx + 1) {
		let close_kind = match &tag.expr {
			Expr::LoopStart { .. } => {
				stack.push(BlockKind::Each);
				continue;
			}
			Expr::ConditionStart(_) => {
				stack.push(BlockKind::If);
				continue;
			}
			Expr::LoopEnd => BlockKind::Each,
			Expr::ConditionEnd => BlockKind::If,
			_ => continue,
		};

		if stack.last() == Some(&close_kind) {
			stack.pop();
			if stack.is_empty() {
				return Some(idx);
			}
		} else {
			push_warning(
				warnings,
				format!(
					"mismatched `${{{}}}` inside a `${{{}}}` block; ignoring it",
					close_kind.close_label(),
					stack.last().map_or("?", |k| k.open_label()),
				),
			);
		}
	}

	None
}

/// Whether `range` overlaps any of the evaluated spans.
fn intersects(evaluated: &[Range<usize>], range: &Range<usize>) -> bool {
	evaluated
		.iter()
		.any(|span| span.start < range.end && range.start < span.end)
}

/// Remove table rows whose fully-stripped text content is empty, shifting
/// the evaluated spans left past the removed rows so they still address
/// the same bytes in the rebuilt buffer.
fn remove_empty_rows(text: &str, evaluated: &mut Vec<Range<usize>>) -> String {
	let mut removals: Vec<Range<usize>> = Vec::new();

	for table in markup::element_spans(text, "w:tbl") {
		let inner = &text[table.clone()];
		for row in markup::element_spans(inner, "w:tr") {
			let absolute = table.start + row.start..table.start + row.end;
			if markup::strip_tags(&text[absolute.clone()]).trim().is_empty() {
				removals.push(absolute);
			}
		}
	}

	if removals.is_empty() {
		return text.to_string();
	}

	let mut out = String::with_capacity(text.len());
	let mut cursor = 0usize;
	for removal in &removals {
		out.push_str(&text[cursor..removal.start]);
		cursor = removal.end;
	}
	out.push_str(&text[cursor..]);

	let shift = |offset: usize| {
		let mut shifted = offset;
		for removal in &removals {
			if removal.end <= offset {
				shifted -= removal.len();
			} else if removal.start < offset {
				shifted -= offset - removal.start;
			}
		}
		shifted
	};
	*evaluated = evaluated
		.iter()
		.map(|span| shift(span.start)..shift(span.end))
		.filter(|span| span.start < span.end)
		.collect();

	out
}

/// Record a template warning, mirroring it to the tracing subscriber.
fn push_warning(warnings: &mut Vec<String>, message: String) {
	warn!("{message}");
	warnings.push(message);
}
