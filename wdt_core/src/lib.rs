//! `wdt` is a template engine for word-processing documents. Templates are
//! ordinary documents carrying `${...}` placeholders (variables with
//! formatter pipes, `#each` loops, and `#if`/`#elseif`/`#else` blocks)
//! which the engine expands against a JSON data tree by rewriting the
//! package's markup parts directly, without a markup object model.

pub use config::*;
pub use error::*;
pub use expression::*;
pub use formatters::*;
pub use processor::*;
pub use repair::*;
pub use scope::*;
pub use source::*;
pub use tables::*;

pub mod config;
mod error;
mod expression;
mod formatters;
pub(crate) mod lexer;
pub(crate) mod markup;
mod processor;
mod repair;
mod scope;
mod source;
mod tables;

#[cfg(test)]
mod __fixtures;
