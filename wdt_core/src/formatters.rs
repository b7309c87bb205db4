//! The process-wide formatter registry and its built-in value transforms.
//!
//! Formatters are pure functions from a value (plus positional arguments)
//! to a value, applied left-to-right in a `${path|a|b}` chain. The
//! registry is populated once at startup and read concurrently afterwards;
//! late registrations are synchronized but expected to happen before
//! concurrent use begins, not interleaved with it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use serde_json::Value;

use crate::expression::FormatterArg;
use crate::expression::coerce_number;

/// A registered formatter function.
pub type FormatterFn = Arc<dyn Fn(&Value, &[FormatterArg]) -> Value + Send + Sync>;

/// A named table of formatter functions, keyed by the name used in
/// placeholder syntax.
pub struct FormatterRegistry {
	entries: RwLock<HashMap<String, FormatterFn>>,
}

impl Default for FormatterRegistry {
	fn default() -> Self {
		Self::with_builtins()
	}
}

impl std::fmt::Debug for FormatterRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FormatterRegistry")
			.field("names", &self.names())
			.finish()
	}
}

impl FormatterRegistry {
	/// An empty registry with no formatters at all.
	pub fn empty() -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// A registry populated with the built-in formatters.
	pub fn with_builtins() -> Self {
		let registry = Self::empty();

		registry.register("date", |value, args| format_date(value, args));
		registry.register("currency", |value, args| format_currency(value, args));
		registry.register("percent", |value, args| format_percent(value, args));
		registry.register("upper", |value, _| Value::String(display_value(value).to_uppercase()));
		registry.register("lower", |value, _| Value::String(display_value(value).to_lowercase()));
		registry.register("capitalize", |value, _| {
			Value::String(capitalize(&display_value(value)))
		});
		registry.register("seq", |value, args| format_seq(value, args));
		registry.register("default", |value, args| format_default(value, args));
		registry.register("trim", |value, _| {
			Value::String(display_value(value).trim().to_string())
		});
		registry.register("truncate", |value, args| format_truncate(value, args));

		registry
	}

	/// Register (or replace) a formatter under `name`.
	pub fn register<F>(&self, name: impl Into<String>, formatter: F)
	where
		F: Fn(&Value, &[FormatterArg]) -> Value + Send + Sync + 'static,
	{
		if let Ok(mut entries) = self.entries.write() {
			entries.insert(name.into(), Arc::new(formatter));
		}
	}

	pub fn contains(&self, name: &str) -> bool {
		self
			.entries
			.read()
			.is_ok_and(|entries| entries.contains_key(name))
	}

	/// Registered formatter names, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self
			.entries
			.read()
			.map(|entries| entries.keys().cloned().collect())
			.unwrap_or_default();
		names.sort();
		names
	}

	/// Apply the named formatter. Returns `None` when the name is unknown;
	/// the caller decides whether that is worth a warning. The value itself
	/// always passes through unchanged in that case.
	pub fn apply(&self, name: &str, value: &Value, args: &[FormatterArg]) -> Option<Value> {
		let formatter = {
			let entries = self.entries.read().ok()?;
			entries.get(name).cloned()?
		};
		Some(formatter(value, args))
	}
}

/// Render a value the way it should appear in document text. Null becomes
/// the empty string; integers print without a fractional part.
pub fn display_value(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::Bool(b) => b.to_string(),
		Value::Number(n) => format_number(n),
		Value::String(s) => s.clone(),
		Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
	}
}

fn format_number(n: &serde_json::Number) -> String {
	if let Some(i) = n.as_i64() {
		return i.to_string();
	}
	if let Some(u) = n.as_u64() {
		return u.to_string();
	}
	let Some(f) = n.as_f64() else {
		return n.to_string();
	};
	if f.fract() == 0.0 && f.abs() < 9e15 {
		format!("{}", f as i64)
	} else {
		format!("{f}")
	}
}

fn arg_text(args: &[FormatterArg], index: usize) -> Option<String> {
	args.get(index).map(FormatterArg::as_text)
}

fn arg_number(args: &[FormatterArg], index: usize) -> Option<f64> {
	args.get(index).and_then(FormatterArg::as_number)
}

fn capitalize(text: &str) -> String {
	let mut chars = text.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
		None => String::new(),
	}
}

/// `date[:pattern]`: format an ISO-8601 string or epoch-millisecond
/// number. Pattern tokens follow the word-processor template convention
/// (`YYYY`, `YY`, `MM`, `DD`, `HH`, `mm`, `ss`); the default pattern is
/// `YYYY-MM-DD`. Unparseable input passes through unchanged.
fn format_date(value: &Value, args: &[FormatterArg]) -> Value {
	let pattern = arg_text(args, 0).unwrap_or_else(|| "YYYY-MM-DD".to_string());

	let Some(moment) = parse_moment(value) else {
		return value.clone();
	};

	Value::String(moment.format(&chrono_pattern(&pattern)).to_string())
}

fn parse_moment(value: &Value) -> Option<NaiveDateTime> {
	match value {
		Value::Number(n) => {
			let millis = n.as_i64()?;
			DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
		}
		Value::String(s) => {
			let text = s.trim();
			if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
				return Some(dt.naive_utc());
			}
			for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
				if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
					return Some(dt);
				}
			}
			NaiveDate::parse_from_str(text, "%Y-%m-%d")
				.ok()
				.and_then(|date| date.and_hms_opt(0, 0, 0))
		}
		_ => None,
	}
}

/// Translate a template date pattern into a chrono format string. Scans
/// greedily so `MM` and `mm` never clobber each other; literal `%` is
/// escaped.
fn chrono_pattern(pattern: &str) -> String {
	const TOKENS: [(&str, &str); 7] = [
		("YYYY", "%Y"),
		("YY", "%y"),
		("MM", "%m"),
		("DD", "%d"),
		("HH", "%H"),
		("mm", "%M"),
		("ss", "%S"),
	];

	let mut out = String::with_capacity(pattern.len());
	let mut rest = pattern;

	'scan: while !rest.is_empty() {
		for (token, replacement) in TOKENS {
			if let Some(after) = rest.strip_prefix(token) {
				out.push_str(replacement);
				rest = after;
				continue 'scan;
			}
		}
		let Some(ch) = rest.chars().next() else {
			break;
		};
		if ch == '%' {
			out.push_str("%%");
		} else {
			out.push(ch);
		}
		rest = &rest[ch.len_utf8()..];
	}

	out
}

/// `currency[:symbol]`: two decimal places with thousands grouping.
/// Non-numeric input passes through unchanged.
fn format_currency(value: &Value, args: &[FormatterArg]) -> Value {
	let amount = coerce_number(Some(value));
	if amount.is_nan() {
		return value.clone();
	}
	let symbol = arg_text(args, 0).unwrap_or_else(|| "$".to_string());

	let negative = amount < 0.0;
	let cents = (amount.abs() * 100.0).round() as u64;
	let whole = group_thousands(cents / 100);
	let fraction = cents % 100;
	let sign = if negative { "-" } else { "" };

	Value::String(format!("{sign}{symbol}{whole}.{fraction:02}"))
}

fn group_thousands(mut n: u64) -> String {
	let mut groups = Vec::new();
	loop {
		if n < 1000 {
			groups.push(n.to_string());
			break;
		}
		groups.push(format!("{:03}", n % 1000));
		n /= 1000;
	}
	groups.reverse();
	groups.join(",")
}

/// `percent[:decimals]`: multiply by 100 and append `%`. Non-numeric
/// input passes through unchanged.
fn format_percent(value: &Value, args: &[FormatterArg]) -> Value {
	let number = coerce_number(Some(value));
	if number.is_nan() {
		return value.clone();
	}
	let decimals = arg_number(args, 0).map_or(0, |d| d.max(0.0) as usize);
	Value::String(format!("{:.*}%", decimals, number * 100.0))
}

/// `seq:style`: map a 0-based index to a sequence label. Styles: `1`
/// (numeric, 1-based), `a`/`A` (alphabetic, 0-based), `i`/`I` (Roman,
/// 1-based). Non-numeric input produces an empty string.
fn format_seq(value: &Value, args: &[FormatterArg]) -> Value {
	let number = coerce_number(Some(value));
	if number.is_nan() || number < 0.0 {
		return Value::String(String::new());
	}
	let index = number as u64;
	let ordinal = index.saturating_add(1);
	let style = arg_text(args, 0).unwrap_or_else(|| "1".to_string());

	let label = match style.as_str() {
		"a" => to_alpha(index),
		"A" => to_alpha(index).to_uppercase(),
		"i" => to_roman(ordinal),
		"I" => to_roman(ordinal).to_uppercase(),
		_ => ordinal.to_string(),
	};

	Value::String(label)
}

/// Spreadsheet-column alphabetic labels: 0 → `a`, 25 → `z`, 26 → `aa`.
fn to_alpha(mut n: u64) -> String {
	let mut letters = Vec::new();
	loop {
		letters.push(b'a' + (n % 26) as u8);
		if n < 26 {
			break;
		}
		n = n / 26 - 1;
	}
	letters.reverse();
	String::from_utf8_lossy(&letters).into_owned()
}

/// Values past the conventional Roman ceiling fall back to decimal, which
/// keeps the label readable and the output length bounded.
fn to_roman(mut n: u64) -> String {
	const ROMAN_MAX: u64 = 3999;
	if n > ROMAN_MAX {
		return n.to_string();
	}

	const PAIRS: [(u64, &str); 13] = [
		(1000, "m"),
		(900, "cm"),
		(500, "d"),
		(400, "cd"),
		(100, "c"),
		(90, "xc"),
		(50, "l"),
		(40, "xl"),
		(10, "x"),
		(9, "ix"),
		(5, "v"),
		(4, "iv"),
		(1, "i"),
	];

	let mut out = String::new();
	for (magnitude, numeral) in PAIRS {
		while n >= magnitude {
			out.push_str(numeral);
			n -= magnitude;
		}
	}
	out
}

/// `default:fallback`: substitute the fallback for null, undefined, or
/// empty-string values; anything else passes through.
fn format_default(value: &Value, args: &[FormatterArg]) -> Value {
	let is_empty = match value {
		Value::Null => true,
		Value::String(s) => s.is_empty(),
		_ => false,
	};
	if !is_empty {
		return value.clone();
	}
	Value::String(arg_text(args, 0).unwrap_or_default())
}

/// `truncate:n`: keep the first `n` characters of the text form.
fn format_truncate(value: &Value, args: &[FormatterArg]) -> Value {
	let Some(limit) = arg_number(args, 0) else {
		return value.clone();
	};
	let limit = limit.max(0.0) as usize;
	Value::String(display_value(value).chars().take(limit).collect())
}
