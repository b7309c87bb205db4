use serde::Deserialize;

/// Row count above which a table is considered "long": a single page break
/// before the table is no longer a complete pagination solution because the
/// table will split across pages regardless.
pub const LONG_TABLE_ROW_THRESHOLD: usize = 35;

/// Per-render options controlling the table pagination pass.
///
/// The options mirror the JSON configuration callers attach to a render
/// request:
///
/// ```json
/// { "tablePageBreaking": true, "longTableSplit": false, "repeatTableHeader": false }
/// ```
///
/// All flags default to `false`; an absent configuration is therefore
/// equivalent to "strip header-repetition markers, change nothing else".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
	/// Insert a page-break paragraph before tables so each table starts on a
	/// fresh page.
	pub table_page_breaking: bool,
	/// Also insert breaks before long tables (more than
	/// [`LONG_TABLE_ROW_THRESHOLD`] rows). Without this flag long tables are
	/// skipped, since they split across pages anyway.
	pub long_table_split: bool,
	/// Keep `tblHeader` header-row-repetition markers. When unset (the
	/// default) every marker is stripped, so a header row never visually
	/// repeats after a forced page break.
	pub repeat_table_header: bool,
}

/// Global switch for the pre-normalization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NormalizationConfig {
	/// When disabled, [`normalize_if_needed`](crate::normalize_if_needed) is
	/// a no-op regardless of what the classifier decided.
	pub enabled: bool,
}

impl Default for NormalizationConfig {
	fn default() -> Self {
		Self { enabled: true }
	}
}
