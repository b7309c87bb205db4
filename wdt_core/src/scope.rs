//! Nested scope resolution for loop contexts.
//!
//! Every render starts with a single root frame holding the whole data
//! tree. Each `#each` iteration pushes a frame holding the current element
//! plus loop metadata; `pop_scope` below the root frame is a defensive
//! no-op so malformed templates can never underflow the stack.

use serde_json::Value;
use serde_json::json;

/// Loop metadata attached to the frame an `#each` iteration pushes,
/// addressable as `$index`, `$first`, `$last`, and `$count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopMeta {
	/// 0-based index of the current element.
	pub index: usize,
	/// Total number of elements in the iterated array.
	pub count: usize,
	pub is_first: bool,
	pub is_last: bool,
}

impl LoopMeta {
	pub fn new(index: usize, count: usize) -> Self {
		Self {
			index,
			count,
			is_first: index == 0,
			is_last: index + 1 == count,
		}
	}
}

#[derive(Debug, Clone)]
struct Frame {
	data: Value,
	loop_meta: Option<LoopMeta>,
}

/// A stack of data frames. The bottom frame is the root data tree and is
/// always present during processing.
#[derive(Debug)]
pub struct ScopeManager {
	frames: Vec<Frame>,
}

impl ScopeManager {
	pub fn new(root: Value) -> Self {
		Self {
			frames: vec![Frame {
				data: root,
				loop_meta: None,
			}],
		}
	}

	/// Push a loop frame. `data` is the current loop element.
	pub fn push_scope(&mut self, data: Value, loop_meta: Option<LoopMeta>) {
		self.frames.push(Frame { data, loop_meta });
	}

	/// Pop the innermost loop frame. Popping the root frame is a no-op.
	pub fn pop_scope(&mut self) {
		if self.frames.len() > 1 {
			self.frames.pop();
		}
	}

	/// Number of frames currently on the stack, root included.
	pub fn depth(&self) -> usize {
		self.frames.len()
	}

	fn current(&self) -> &Frame {
		// The constructor guarantees at least the root frame.
		self.frames.last().expect("scope stack holds a root frame")
	}

	/// Resolve a path to a value, or `None` for undefined.
	///
	/// Resolution order:
	/// 1. `$index` / `$first` / `$last` / `$count` read the current frame's
	///    loop metadata only.
	/// 2. `this` is the current frame's data; `this.rest` resolves `rest`
	///    against the current frame only.
	/// 3. Each leading `../` shifts the lookup one frame down the stack
	///    (clamped at the root tree).
	/// 4. Anything else tries a prioritized candidate list: the current
	///    frame, then each enclosing frame outward, ending at the root
	///    tree. The first defined hit wins.
	pub fn resolve(&self, path: &str) -> Option<Value> {
		let path = path.trim();

		if let Some(field) = path.strip_prefix('$') {
			let meta = self.current().loop_meta?;
			return match field {
				"index" => Some(json!(meta.index)),
				"first" => Some(Value::Bool(meta.is_first)),
				"last" => Some(Value::Bool(meta.is_last)),
				"count" => Some(json!(meta.count)),
				_ => None,
			};
		}

		if path == "this" {
			return Some(self.current().data.clone());
		}

		if let Some(rest) = path.strip_prefix("this.") {
			return resolve_path(&self.current().data, rest);
		}

		if path.starts_with("../") {
			let mut levels = 0usize;
			let mut rest = path;
			while let Some(stripped) = rest.strip_prefix("../") {
				levels += 1;
				rest = stripped;
			}
			// More `../` than enclosing frames lands on the root tree.
			let frame_index = self.frames.len().saturating_sub(1).saturating_sub(levels);
			let data = &self.frames[frame_index].data;
			return if rest.is_empty() {
				Some(data.clone())
			} else {
				resolve_path(data, rest)
			};
		}

		// Prioritized candidate frames, innermost first, root tree last.
		let candidates = self.frames.iter().rev().map(|frame| &frame.data);
		for data in candidates {
			if let Some(value) = resolve_path(data, path) {
				return Some(value);
			}
		}

		None
	}
}

/// Resolve a dotted/indexed path against one data value. Any miss (absent
/// key, indexing a non-array, index out of range, malformed brackets)
/// yields `None`, never a panic.
fn resolve_path(data: &Value, path: &str) -> Option<Value> {
	let mut current = data;

	for segment in path.split('.') {
		let (name, indices) = split_segment(segment)?;

		if !name.is_empty() {
			current = current.as_object()?.get(name)?;
		}
		for index in indices {
			current = current.as_array()?.get(index)?;
		}
	}

	Some(current.clone())
}

/// Split one path segment into its key name and trailing bracket indices:
/// `items[3][0]` becomes `("items", [3, 0])`.
fn split_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
	if segment.is_empty() {
		return None;
	}

	let Some(bracket) = segment.find('[') else {
		return Some((segment, Vec::new()));
	};

	let name = &segment[..bracket];
	let mut indices = Vec::new();
	let mut rest = &segment[bracket..];

	while !rest.is_empty() {
		let inner = rest.strip_prefix('[')?;
		let close = inner.find(']')?;
		indices.push(inner[..close].parse().ok()?);
		rest = &inner[close + 1..];
	}

	Some((name, indices))
}
