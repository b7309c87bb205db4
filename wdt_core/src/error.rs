use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum WdtError {
	#[error("malformed document package: {0}")]
	#[diagnostic(code(wdt::malformed_package))]
	MalformedPackage(String),

	#[error("document package is missing required part: `{0}`")]
	#[diagnostic(
		code(wdt::missing_part),
		help("a word-processor package must contain at least `word/document.xml`")
	)]
	MissingPart(String),

	#[error("external document conversion failed during {stage}: {reason}")]
	#[diagnostic(
		code(wdt::convert),
		help("the conversion service is external; retry or fall back to the unnormalized package")
	)]
	Convert { stage: String, reason: String },
}

pub type WdtResult<T> = Result<T, WdtError>;
