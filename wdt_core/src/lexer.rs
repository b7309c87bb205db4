use std::ops::Range;

use logos::Logos;

/// A `${...}` placeholder located in markup text. `range` covers the whole
/// token including the delimiters; `payload` is the text between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTag {
	pub range: Range<usize>,
	pub payload: String,
}

/// Quote state while scanning a placeholder payload.
enum QuoteState {
	None,
	Single,
	Double,
}

/// Walks markup text collecting placeholder tags. A `}` inside a quoted
/// string does not terminate the placeholder, so formatter arguments may
/// contain any delimiter character.
struct TagScanner<'a> {
	source: &'a str,
	cursor: usize,
	tags: Vec<RawTag>,
}

impl<'a> TagScanner<'a> {
	fn new(source: &'a str) -> Self {
		Self {
			source,
			cursor: 0,
			tags: Vec::new(),
		}
	}

	fn process(&mut self) {
		while let Some(open) = self.source[self.cursor..].find("${").map(|i| i + self.cursor) {
			let Some(close) = self.find_close(open + 2) else {
				// An unterminated `${` is literal text; higher layers decide
				// whether to warn about it.
				break;
			};

			self.tags.push(RawTag {
				range: open..close + 1,
				payload: self.source[open + 2..close].to_string(),
			});
			self.cursor = close + 1;
		}
	}

	/// Find the `}` terminating the placeholder that opened just before
	/// `from`, honoring quoted substrings.
	fn find_close(&self, from: usize) -> Option<usize> {
		let mut quote = QuoteState::None;

		for (offset, ch) in self.source[from..].char_indices() {
			match (ch, &quote) {
				('\'', QuoteState::None) => quote = QuoteState::Single,
				('\'', QuoteState::Single) => quote = QuoteState::None,
				('"', QuoteState::None) => quote = QuoteState::Double,
				('"', QuoteState::Double) => quote = QuoteState::None,
				('}', QuoteState::None) => return Some(from + offset),
				_ => {}
			}
		}

		None
	}
}

/// Collect every placeholder tag in `text`, in document order.
pub fn scan_tags(text: &str) -> Vec<RawTag> {
	let mut scanner = TagScanner::new(text);
	scanner.process();
	scanner.tags
}

/// Raw tokens produced by logos for flat tokenization of a placeholder
/// payload. Everything that is not a delimiter, operator, or quoted string
/// collapses into `Word`, which keeps dotted/indexed paths (`items[0].name`)
/// and keywords (`#each`, `/if`) intact as single tokens.
#[derive(Logos, Debug, PartialEq)]
enum RawToken {
	#[token("|")]
	Pipe,
	#[token(":")]
	Colon,
	#[token("==")]
	EqEq,
	#[token("!=")]
	NotEq,
	#[token(">=")]
	GtEq,
	#[token("<=")]
	LtEq,
	#[token(">")]
	Gt,
	#[token("<")]
	Lt,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuoted,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuoted,
	#[regex(r"[ \t\r\n]+")]
	Whitespace,
	#[regex(r#"[^|:=!<>'" \t\r\n]+"#)]
	Word,
}

/// The comparison operators a condition may use, ordered so that the
/// two-character forms are probed before their one-character prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
	Eq,
	Neq,
	Gte,
	Lte,
	Gt,
	Lt,
}

impl std::fmt::Display for CmpOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Eq => write!(f, "=="),
			Self::Neq => write!(f, "!="),
			Self::Gte => write!(f, ">="),
			Self::Lte => write!(f, "<="),
			Self::Gt => write!(f, ">"),
			Self::Lt => write!(f, "<"),
		}
	}
}

/// A payload token after context-independent cleanup: whitespace dropped,
/// quoted strings unescaped to their inner text, everything unrecognized
/// preserved as a `Word`.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadToken {
	Pipe,
	Colon,
	Op(CmpOp),
	Str(String),
	Word(String),
}

/// Unescape the body of a quoted string: `\"`, `\'`, and `\\` collapse to
/// the escaped character; any other backslash pair is kept verbatim.
fn unescape_quoted(inner: &str) -> String {
	let mut out = String::with_capacity(inner.len());
	let mut chars = inner.chars();
	while let Some(ch) = chars.next() {
		if ch == '\\' {
			match chars.next() {
				Some(next @ ('"' | '\'' | '\\')) => out.push(next),
				Some(next) => {
					out.push('\\');
					out.push(next);
				}
				None => out.push('\\'),
			}
		} else {
			out.push(ch);
		}
	}
	out
}

/// Tokenize a placeholder payload into a flat token stream.
pub fn tokenize_payload(payload: &str) -> Vec<PayloadToken> {
	let mut tokens = Vec::new();

	for (result, span) in RawToken::lexer(payload).spanned() {
		let slice = &payload[span];
		match result {
			Ok(RawToken::Pipe) => tokens.push(PayloadToken::Pipe),
			Ok(RawToken::Colon) => tokens.push(PayloadToken::Colon),
			Ok(RawToken::EqEq) => tokens.push(PayloadToken::Op(CmpOp::Eq)),
			Ok(RawToken::NotEq) => tokens.push(PayloadToken::Op(CmpOp::Neq)),
			Ok(RawToken::GtEq) => tokens.push(PayloadToken::Op(CmpOp::Gte)),
			Ok(RawToken::LtEq) => tokens.push(PayloadToken::Op(CmpOp::Lte)),
			Ok(RawToken::Gt) => tokens.push(PayloadToken::Op(CmpOp::Gt)),
			Ok(RawToken::Lt) => tokens.push(PayloadToken::Op(CmpOp::Lt)),
			Ok(RawToken::DoubleQuoted | RawToken::SingleQuoted) => {
				tokens.push(PayloadToken::Str(unescape_quoted(&slice[1..slice.len() - 1])));
			}
			Ok(RawToken::Whitespace) => {}
			// Stray `=`, `!`, or unpaired quotes land here; keep them as
			// words so malformed payloads degrade instead of vanishing.
			Ok(RawToken::Word) | Err(()) => tokens.push(PayloadToken::Word(slice.to_string())),
		}
	}

	tokens
}
