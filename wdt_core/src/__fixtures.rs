use serde_json::Value;
use serde_json::json;

use crate::WdtResult;
use crate::source::DocumentConverter;
use crate::source::TargetFormat;

/// A paragraph with a single run of plain text.
pub fn paragraph(text: &str) -> String {
	format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

/// A minimal document part wrapping `body`.
pub fn document(body: &str) -> String {
	format!("<w:document><w:body>{body}</w:body></w:document>")
}

/// A paragraph whose placeholder was split across two runs by the editor,
/// with run properties on the first run and paragraph properties present.
pub fn split_run_paragraph() -> String {
	concat!(
		"<w:p>",
		"<w:pPr><w:jc w:val=\"left\"/></w:pPr>",
		"<w:r><w:rPr><w:b/></w:rPr><w:t>${user.</w:t></w:r>",
		"<w:r><w:t>name}</w:t></w:r>",
		"</w:p>"
	)
	.to_string()
}

/// A table with `rows` single-cell rows, each holding the given cell texts
/// cycled in order.
pub fn table(rows: usize) -> String {
	let mut out = String::from("<w:tbl><w:tblPr><w:tblW w:w=\"0\"/></w:tblPr>");
	for index in 0..rows {
		out.push_str(&format!(
			"<w:tr><w:tc><w:p><w:r><w:t>row {index}</w:t></w:r></w:p></w:tc></w:tr>"
		));
	}
	out.push_str("</w:tbl>");
	out
}

/// A single-column table whose one data row holds `text`, preceded by a
/// header row carrying a repetition marker.
pub fn table_with_header_marker(text: &str) -> String {
	format!(
		concat!(
			"<w:tbl><w:tblPr/>",
			"<w:tr><w:trPr><w:tblHeader/></w:trPr>",
			"<w:tc><w:p><w:r><w:t>Heading</w:t></w:r></w:p></w:tc></w:tr>",
			"<w:tr><w:tc><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:tc></w:tr>",
			"</w:tbl>"
		),
		text
	)
}

/// The data tree most processor tests run against.
pub fn sample_data() -> Value {
	json!({
		"user": { "name": "Ann", "age": 34 },
		"items": ["First Item", "Second Item"],
		"orders": [
			{ "id": "A-1", "lines": [{ "qty": 2 }, { "qty": 5 }] },
			{ "id": "B-7", "lines": [{ "qty": 1 }] },
		],
		"empty": [],
		"total": 1234567.891,
		"ratio": 0.256,
		"signed": "2024-03-05",
		"notes": null,
	})
}

/// A converter that tags the bytes it touches, so tests can tell whether
/// normalization actually ran.
pub struct TaggingConverter;

impl DocumentConverter for TaggingConverter {
	fn normalize(&self, bytes: &[u8]) -> WdtResult<Vec<u8>> {
		let mut out = b"normalized:".to_vec();
		out.extend_from_slice(bytes);
		Ok(out)
	}

	fn convert(&self, bytes: &[u8], _target: TargetFormat) -> WdtResult<Vec<u8>> {
		Ok(bytes.to_vec())
	}
}
