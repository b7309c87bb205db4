//! Parsing and evaluation of a single `${...}` payload.
//!
//! A payload classifies into a block instruction (`#each`, `#if`,
//! `#elseif`, `#else`, `/each`, `/if`) or a variable reference with an
//! optional pipe-delimited formatter chain. Parsing never fails: malformed
//! payloads degrade into variable references that resolve to undefined,
//! which higher layers turn into empty output plus a warning.

use float_cmp::approx_eq;
use serde_json::Value;

pub use crate::lexer::CmpOp;
use crate::lexer::PayloadToken;
use crate::lexer::tokenize_payload;
use crate::scope::ScopeManager;

/// A formatter argument, parsed by syntactic form.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FormatterArg {
	/// A quoted string value, e.g. `'YYYY-MM-DD'`.
	String(String),
	/// A numeric value, e.g. `2`.
	Number(f64),
	/// A bare unquoted token, e.g. `a` in `seq:a`.
	Token(String),
}

impl FormatterArg {
	/// String form of the argument, regardless of its syntactic kind.
	pub fn as_text(&self) -> String {
		match self {
			Self::String(s) | Self::Token(s) => s.clone(),
			Self::Number(n) => {
				if n.fract() == 0.0 {
					format!("{}", *n as i64)
				} else {
					format!("{n}")
				}
			}
		}
	}

	/// Numeric form of the argument, when it has one.
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			Self::String(s) | Self::Token(s) => s.trim().parse().ok(),
		}
	}
}

/// One call in a formatter chain: `name:arg:arg`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatterCall {
	pub name: String,
	pub args: Vec<FormatterArg>,
}

/// A right-hand-side literal in a condition, parsed by syntactic form.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Literal {
	Bool(bool),
	Number(f64),
	Null,
	String(String),
}

impl PartialEq for Literal {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Number(a), Self::Number(b)) => approx_eq!(f64, *a, *b, ulps = 2),
			(Self::Null, Self::Null) => true,
			(Self::String(a), Self::String(b)) => a == b,
			_ => false,
		}
	}
}

/// The test a condition applies to its resolved left-hand value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTest {
	/// Bare `#if path`: passes when the value is truthy.
	Truthy,
	/// `#if path <op> literal`.
	Compare(CmpOp, Literal),
}

/// A parsed `#if` / `#elseif` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
	/// The scope path whose value is tested.
	pub left: String,
	pub test: ConditionTest,
}

/// A classified placeholder payload.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Expr {
	/// `${path|formatter:arg|...}`
	Variable {
		path: String,
		formatters: Vec<FormatterCall>,
	},
	/// `${#each path}`
	LoopStart { path: String },
	/// `${/each}`
	LoopEnd,
	/// `${#if condition}`
	ConditionStart(Condition),
	/// `${#elseif condition}`
	ElseIf(Condition),
	/// `${#else}`
	Else,
	/// `${/if}`
	ConditionEnd,
}

/// Replace smart/curly quotes with their straight forms. Authoring tools
/// substitute these inside typed placeholder text, which would otherwise
/// break literal and argument parsing.
pub fn normalize_quotes(text: &str) -> String {
	text
		.chars()
		.map(|ch| {
			match ch {
				'\u{2018}' | '\u{2019}' => '\'',
				'\u{201C}' | '\u{201D}' => '"',
				_ => ch,
			}
		})
		.collect()
}

/// Classify a trimmed placeholder payload.
pub fn parse(raw: &str) -> Expr {
	let payload = normalize_quotes(raw.trim());

	match payload.as_str() {
		"/each" => return Expr::LoopEnd,
		"/if" => return Expr::ConditionEnd,
		"#else" => return Expr::Else,
		_ => {}
	}

	if let Some(rest) = keyword_rest(&payload, "#each") {
		return Expr::LoopStart {
			path: rest.trim().to_string(),
		};
	}
	if let Some(rest) = keyword_rest(&payload, "#elseif") {
		return Expr::ElseIf(parse_condition(rest.trim()));
	}
	if let Some(rest) = keyword_rest(&payload, "#if") {
		return Expr::ConditionStart(parse_condition(rest.trim()));
	}

	parse_variable(&payload)
}

/// Strip `keyword` from the start of `payload`, requiring it to be followed
/// by whitespace (so `#ifx` is not an `#if`).
fn keyword_rest<'a>(payload: &'a str, keyword: &str) -> Option<&'a str> {
	let rest = payload.strip_prefix(keyword)?;
	if rest.starts_with(char::is_whitespace) {
		Some(rest)
	} else {
		None
	}
}

/// Parse a condition expression. Operators are probed in
/// longest-operator-first order so `>` never matches inside `>=`; the first
/// syntactic match wins. An expression with no operator is a truthy check.
pub fn parse_condition(expr: &str) -> Condition {
	const OPERATORS: [(&str, CmpOp); 6] = [
		("==", CmpOp::Eq),
		("!=", CmpOp::Neq),
		(">=", CmpOp::Gte),
		("<=", CmpOp::Lte),
		(">", CmpOp::Gt),
		("<", CmpOp::Lt),
	];

	for (symbol, op) in OPERATORS {
		if let Some(at) = find_outside_quotes(expr, symbol) {
			let left = expr[..at].trim().to_string();
			let right = expr[at + symbol.len()..].trim();
			return Condition {
				left,
				test: ConditionTest::Compare(op, parse_literal(right)),
			};
		}
	}

	Condition {
		left: expr.trim().to_string(),
		test: ConditionTest::Truthy,
	}
}

/// Find `needle` in `haystack` outside any quoted substring.
fn find_outside_quotes(haystack: &str, needle: &str) -> Option<usize> {
	let mut quote: Option<char> = None;

	for (offset, ch) in haystack.char_indices() {
		match quote {
			Some(open) => {
				if ch == open {
					quote = None;
				}
			}
			None => {
				if ch == '\'' || ch == '"' {
					quote = Some(ch);
				} else if haystack[offset..].starts_with(needle) {
					return Some(offset);
				}
			}
		}
	}

	None
}

/// Parse a right-hand literal by syntactic form: boolean, null, number,
/// quoted string, or bare string.
pub fn parse_literal(raw: &str) -> Literal {
	match raw {
		"true" => return Literal::Bool(true),
		"false" => return Literal::Bool(false),
		"null" => return Literal::Null,
		_ => {}
	}

	if raw.len() >= 2 {
		let bytes = raw.as_bytes();
		if (bytes[0] == b'\'' && bytes[raw.len() - 1] == b'\'')
			|| (bytes[0] == b'"' && bytes[raw.len() - 1] == b'"')
		{
			return Literal::String(raw[1..raw.len() - 1].to_string());
		}
	}

	if let Ok(number) = raw.parse::<f64>() {
		return Literal::Number(number);
	}

	Literal::String(raw.to_string())
}

/// Parse `path|formatter:arg|...`. The pipe split happens on the token
/// stream, so quoted arguments may contain `|` and `:`.
fn parse_variable(payload: &str) -> Expr {
	let tokens = tokenize_payload(payload);
	let mut segments: Vec<Vec<PayloadToken>> = vec![Vec::new()];

	for token in tokens {
		if token == PayloadToken::Pipe {
			segments.push(Vec::new());
		} else if let Some(last) = segments.last_mut() {
			last.push(token);
		}
	}

	let path = segments[0]
		.iter()
		.find_map(|token| {
			match token {
				PayloadToken::Word(word) => Some(word.clone()),
				_ => None,
			}
		})
		.unwrap_or_default();

	let formatters = segments[1..]
		.iter()
		.filter_map(|segment| parse_formatter_call(segment))
		.collect();

	Expr::Variable { path, formatters }
}

/// Parse one `name:arg:arg` formatter segment. A segment with no leading
/// identifier is dropped.
fn parse_formatter_call(tokens: &[PayloadToken]) -> Option<FormatterCall> {
	let mut iter = tokens.iter();

	let name = loop {
		match iter.next()? {
			PayloadToken::Word(word) => break word.clone(),
			PayloadToken::Str(text) => break text.clone(),
			_ => return None,
		}
	};

	let mut args = Vec::new();
	while let Some(token) = iter.next() {
		if *token != PayloadToken::Colon {
			continue;
		}
		match iter.next() {
			Some(PayloadToken::Str(text)) => args.push(FormatterArg::String(text.clone())),
			Some(PayloadToken::Word(word)) => {
				if let Ok(number) = word.parse::<f64>() {
					args.push(FormatterArg::Number(number));
				} else {
					args.push(FormatterArg::Token(word.clone()));
				}
			}
			_ => break,
		}
	}

	Some(FormatterCall { name, args })
}

/// JavaScript-style truthiness over a resolved value. `undefined`, `null`,
/// `false`, `0`, and `""` are falsy; arrays and objects (even empty ones)
/// are truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
	match value {
		None | Some(Value::Null) => false,
		Some(Value::Bool(b)) => *b,
		Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
		Some(Value::String(s)) => !s.is_empty(),
		Some(Value::Array(_) | Value::Object(_)) => true,
	}
}

/// `Number()`-style loose coercion. Anything non-numeric coerces to NaN,
/// which makes every ordered comparison false.
pub fn coerce_number(value: Option<&Value>) -> f64 {
	match value {
		Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
		Some(Value::String(s)) => {
			let trimmed = s.trim();
			if trimmed.is_empty() {
				0.0
			} else {
				trimmed.parse().unwrap_or(f64::NAN)
			}
		}
		Some(Value::Bool(b)) => {
			if *b {
				1.0
			} else {
				0.0
			}
		}
		Some(Value::Null) => 0.0,
		None | Some(Value::Array(_) | Value::Object(_)) => f64::NAN,
	}
}

fn literal_number(literal: &Literal) -> f64 {
	match literal {
		Literal::Number(n) => *n,
		Literal::Bool(b) => {
			if *b {
				1.0
			} else {
				0.0
			}
		}
		Literal::Null => 0.0,
		Literal::String(s) => {
			let trimmed = s.trim();
			if trimmed.is_empty() {
				0.0
			} else {
				trimmed.parse().unwrap_or(f64::NAN)
			}
		}
	}
}

/// Loose equality between a resolved value and a literal: string-to-string
/// compares textually, everything else goes through numeric coercion (so
/// `5 == '5'` holds while `true == 'true'` does not).
fn loose_eq(value: Option<&Value>, literal: &Literal) -> bool {
	match literal {
		Literal::Null => matches!(value, None | Some(Value::Null)),
		Literal::String(expected) => {
			match value {
				Some(Value::String(actual)) => actual == expected,
				_ => {
					let left = coerce_number(value);
					let right = literal_number(literal);
					!left.is_nan() && !right.is_nan() && approx_eq!(f64, left, right, ulps = 2)
				}
			}
		}
		Literal::Bool(_) | Literal::Number(_) => {
			let left = coerce_number(value);
			let right = literal_number(literal);
			!left.is_nan() && !right.is_nan() && approx_eq!(f64, left, right, ulps = 2)
		}
	}
}

/// Evaluate a condition against the current scope.
pub fn evaluate_condition(condition: &Condition, scope: &ScopeManager) -> bool {
	let value = scope.resolve(&condition.left);

	match &condition.test {
		ConditionTest::Truthy => is_truthy(value.as_ref()),
		ConditionTest::Compare(CmpOp::Eq, literal) => loose_eq(value.as_ref(), literal),
		ConditionTest::Compare(CmpOp::Neq, literal) => !loose_eq(value.as_ref(), literal),
		ConditionTest::Compare(op, literal) => {
			let left = coerce_number(value.as_ref());
			let right = literal_number(literal);
			if left.is_nan() || right.is_nan() {
				return false;
			}
			match op {
				CmpOp::Gt => left > right,
				CmpOp::Lt => left < right,
				CmpOp::Gte => left >= right,
				CmpOp::Lte => left <= right,
				CmpOp::Eq | CmpOp::Neq => false,
			}
		}
	}
}
