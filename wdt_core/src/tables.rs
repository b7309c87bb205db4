//! Table pagination: page breaks before tables, row split protection, and
//! header-row-repetition control, all by direct markup surgery.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::LONG_TABLE_ROW_THRESHOLD;
use crate::config::RenderOptions;
use crate::markup;

/// The paragraph inserted before a table to force it onto a fresh page.
const PAGE_BREAK_PARAGRAPH: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Every syntactic form a header-row-repetition marker may take:
/// self-closing with or without attributes, or paired. The paired branch
/// must not cross into other tags, or a self-closing marker followed by a
/// paired one elsewhere would swallow the markup between them.
static TBL_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"<w:tblHeader\b[^>]*/>|<w:tblHeader\b[^>]*>[^<]*</w:tblHeader>")
		.expect("valid regex")
});

/// A table located in the current markup text. Recomputed on every call;
/// row counts depend on already-expanded loop content, so descriptors are
/// never persisted across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
	/// Byte range of the whole `<w:tbl>…</w:tbl>` element.
	pub range: Range<usize>,
	/// Number of direct rows (rows of nested tables are not counted).
	pub row_count: usize,
}

impl TableDescriptor {
	/// Whether a single page break before this table is no longer a
	/// complete pagination solution.
	pub fn is_long(&self) -> bool {
		self.row_count > LONG_TABLE_ROW_THRESHOLD
	}
}

/// Locate all tables in document order, non-overlapping.
pub fn scan_tables(markup_text: &str) -> Vec<TableDescriptor> {
	markup::element_spans(markup_text, "w:tbl")
		.into_iter()
		.map(|range| {
			let row_count = markup::element_spans(&markup_text[range.clone()], "w:tr").len();
			TableDescriptor { range, row_count }
		})
		.collect()
}

/// One pending replacement of a byte range. Edits are collected against
/// the unmodified source and applied together in a single forward pass,
/// so offsets never need adjusting as earlier edits land.
struct Edit {
	range: Range<usize>,
	text: String,
}

/// Apply non-overlapping edits to `source`, producing a new buffer.
fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
	edits.sort_by_key(|edit| edit.range.start);

	let mut out = String::with_capacity(source.len());
	let mut cursor = 0usize;
	for edit in edits {
		out.push_str(&source[cursor..edit.range.start]);
		out.push_str(&edit.text);
		cursor = edit.range.end;
	}
	out.push_str(&source[cursor..]);
	out
}

/// Post-process the main body markup according to the render options.
pub fn process_document(markup_text: &str, options: &RenderOptions) -> String {
	let mut text = markup_text.to_string();

	if options.table_page_breaking {
		let mut edits = Vec::new();
		for table in scan_tables(&text) {
			if table.is_long() && !options.long_table_split {
				// The table will split across pages anyway; a break in
				// front of it would not help.
				debug!(rows = table.row_count, "skipping page break before long table");
				continue;
			}

			let marked = protect_rows(&text[table.range.clone()]);
			edits.push(Edit {
				range: table.range,
				text: format!("{PAGE_BREAK_PARAGRAPH}{marked}"),
			});
		}
		text = apply_edits(&text, edits);
	}

	if !options.repeat_table_header {
		text = strip_header_markers(&text);
	}

	text
}

/// Mark every row of a broken-before table so it cannot split internally,
/// and every row but the last to keep with the next row, so the table is
/// never torn mid-row across the page boundary the break introduces.
fn protect_rows(table: &str) -> String {
	let rows = markup::element_spans(table, "w:tr");
	let count = rows.len();

	let edits = rows
		.into_iter()
		.enumerate()
		.map(|(index, row)| {
			let is_last = index + 1 == count;
			let mut rebuilt = ensure_row_property(&table[row.clone()], "<w:cantSplit/>");
			if !is_last {
				rebuilt = keep_with_next(&rebuilt);
			}
			Edit {
				range: row,
				text: rebuilt,
			}
		})
		.collect();

	apply_edits(table, edits)
}

/// Ensure `property` is present in the row's `<w:trPr>` block, creating
/// the block right after the row open tag when missing.
fn ensure_row_property(row: &str, property: &str) -> String {
	insert_into_property_block(row, "w:trPr", property)
}

/// Add a keep-next marker to every paragraph of a row.
fn keep_with_next(row: &str) -> String {
	markup::PARAGRAPH_RE
		.replace_all(row, |caps: &regex::Captures<'_>| {
			insert_into_property_block(&caps[0], "w:pPr", "<w:keepNext/>")
		})
		.into_owned()
}

/// Insert `property` into the element's `<container>` block, creating or
/// expanding the block as needed. Elements that already carry the property
/// are returned unchanged.
fn insert_into_property_block(element: &str, container: &str, property: &str) -> String {
	let marker = property.trim_end_matches("/>").trim_start_matches('<');
	if element.contains(&format!("<{marker}")) {
		return element.to_string();
	}

	match markup::find_open_tag(element, container) {
		Some((range, true)) => {
			// Self-closing container: expand it around the property.
			let mut out = String::with_capacity(element.len() + property.len() + container.len() + 5);
			out.push_str(&element[..range.start]);
			out.push_str(&format!("<{container}>{property}</{container}>"));
			out.push_str(&element[range.end..]);
			out
		}
		Some((range, false)) => {
			let mut out = String::with_capacity(element.len() + property.len());
			out.push_str(&element[..range.end]);
			out.push_str(property);
			out.push_str(&element[range.end..]);
			out
		}
		None => {
			// No properties block yet; create one directly after the
			// element's own open tag.
			let Some(open_end) = element.find('>').map(|i| i + 1) else {
				return element.to_string();
			};
			let mut out = String::with_capacity(element.len() + property.len() + container.len() + 5);
			out.push_str(&element[..open_end]);
			out.push_str(&format!("<{container}>{property}</{container}>"));
			out.push_str(&element[open_end..]);
			out
		}
	}
}

/// Strip every header-row-repetition marker from every table, in every
/// syntactic form, so a header row never visually repeats after a forced
/// page break.
pub fn strip_header_markers(markup_text: &str) -> String {
	TBL_HEADER_RE.replace_all(markup_text, "").into_owned()
}
