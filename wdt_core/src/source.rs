//! Source classification and the pre-normalization policy.
//!
//! Different authoring tools split placeholder text across runs in
//! different (sometimes pathological) ways. Re-saving a package through
//! the external conversion service produces consistent run behavior, so
//! the classifier inspects package metadata and decides, fail-safe toward
//! normalizing, whether that round trip is needed. The conversion itself
//! is the caller's job; this module only decides and delegates through the
//! [`DocumentConverter`] seam.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::WdtResult;
use crate::config::NormalizationConfig;

static APPLICATION_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<Application[^>]*>(.*?)</Application>").expect("valid regex"));

static CREATOR_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)<dc:creator[^>]*>(.*?)</dc:creator>").expect("valid regex"));

/// Metadata fields extracted from a package's property parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMeta {
	/// The `Application` field of the extended-properties part.
	pub application: Option<String>,
	/// The `dc:creator` field of the core-properties part.
	pub creator: Option<String>,
}

impl PackageMeta {
	/// Extract metadata from the raw texts of the extended-properties part
	/// (`docProps/app.xml`) and the core-properties part
	/// (`docProps/core.xml`), either of which may be missing.
	pub fn from_parts(app_part: Option<&str>, core_part: Option<&str>) -> Self {
		let field = |re: &Regex, text: Option<&str>| {
			text
				.and_then(|t| re.captures(t))
				.map(|caps| caps[1].trim().to_string())
				.filter(|value| !value.is_empty())
		};

		Self {
			application: field(&APPLICATION_RE, app_part),
			creator: field(&CREATOR_RE, core_part),
		}
	}
}

/// The authoring tool a package was classified as coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum DocumentSource {
	/// Native Microsoft Word output.
	MicrosoftWord,
	WpsOffice,
	LibreOffice,
	OpenOffice,
	/// A cloud-editor export: such packages typically carry no application
	/// metadata at all.
	CloudEditor,
	Unknown,
}

impl std::fmt::Display for DocumentSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::MicrosoftWord => write!(f, "Microsoft Word"),
			Self::WpsOffice => write!(f, "WPS Office"),
			Self::LibreOffice => write!(f, "LibreOffice"),
			Self::OpenOffice => write!(f, "OpenOffice"),
			Self::CloudEditor => write!(f, "cloud editor"),
			Self::Unknown => write!(f, "unknown"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Confidence {
	High,
	Low,
}

/// The classifier's verdict for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
	pub source: DocumentSource,
	pub confidence: Confidence,
	pub needs_normalization: bool,
	/// Human-readable explanation, carried through to the normalization
	/// result for observability.
	pub reason: String,
}

/// Classify the originating authoring tool from package metadata.
///
/// Heuristics, checked in order: a known non-Word application name in the
/// metadata; a Word signature; no application metadata at all (cloud
/// editors strip it); otherwise unknown. Every branch except native Word
/// requests normalization: when in doubt, normalize.
pub fn detect(meta: &PackageMeta) -> Detection {
	let haystack = format!(
		"{} {}",
		meta.application.as_deref().unwrap_or_default(),
		meta.creator.as_deref().unwrap_or_default()
	)
	.to_lowercase();

	let known_foreign = [
		("wps", DocumentSource::WpsOffice),
		("libreoffice", DocumentSource::LibreOffice),
		("openoffice", DocumentSource::OpenOffice),
	];
	for (needle, source) in known_foreign {
		if haystack.contains(needle) {
			let detection = Detection {
				source,
				confidence: Confidence::High,
				needs_normalization: true,
				reason: format!("document produced by {source}"),
			};
			debug!(source = %source, "classified document source");
			return detection;
		}
	}

	if haystack.contains("microsoft office word") || haystack.contains("microsoft word") {
		let detection = Detection {
			source: DocumentSource::MicrosoftWord,
			confidence: Confidence::High,
			needs_normalization: false,
			reason: "native Microsoft Word document".to_string(),
		};
		debug!(source = %detection.source, "classified document source");
		return detection;
	}

	if meta.application.is_none() {
		let detection = Detection {
			source: DocumentSource::CloudEditor,
			confidence: Confidence::Low,
			needs_normalization: true,
			reason: "no application metadata; treating as a cloud-editor export".to_string(),
		};
		debug!(source = %detection.source, "classified document source");
		return detection;
	}

	let detection = Detection {
		source: DocumentSource::Unknown,
		confidence: Confidence::Low,
		needs_normalization: true,
		reason: format!(
			"unrecognized application metadata `{}`",
			meta.application.as_deref().unwrap_or_default()
		),
	};
	debug!(source = %detection.source, "classified document source");
	detection
}

/// Target formats the external conversion service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum TargetFormat {
	Docx,
	Pdf,
}

/// The seam to the external headless conversion service. The engine never
/// performs the conversion itself; callers provide an implementation and
/// wrap it with their own timeout and temp-resource cleanup.
pub trait DocumentConverter {
	/// Re-save the package to produce consistent run-splitting behavior.
	fn normalize(&self, bytes: &[u8]) -> WdtResult<Vec<u8>>;

	/// Convert the package to another document format.
	fn convert(&self, bytes: &[u8], target: TargetFormat) -> WdtResult<Vec<u8>>;
}

/// A package after the normalization policy ran. `reason` is set only when
/// normalization actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPackage {
	pub bytes: Vec<u8>,
	pub reason: Option<String>,
}

/// Apply the normalization policy: a no-op when globally disabled or when
/// the classifier decided normalization is not needed; otherwise delegate
/// to the converter and tag the result with the classifier's reason.
pub fn normalize_if_needed(
	bytes: &[u8],
	detection: &Detection,
	config: &NormalizationConfig,
	converter: &dyn DocumentConverter,
) -> WdtResult<NormalizedPackage> {
	if !config.enabled || !detection.needs_normalization {
		return Ok(NormalizedPackage {
			bytes: bytes.to_vec(),
			reason: None,
		});
	}

	debug!(reason = %detection.reason, "normalizing package before template processing");
	let normalized = converter.normalize(bytes)?;

	Ok(NormalizedPackage {
		bytes: normalized,
		reason: Some(detection.reason.clone()),
	})
}
