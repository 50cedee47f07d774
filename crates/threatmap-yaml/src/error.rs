//! Error and diagnostic system for Threatmap documents.
//!
//! The error system is built around the [`Diagnostic`] type, which represents
//! a single error or warning with an optional error code, labelled source
//! spans and help text. Multiple diagnostics are wrapped in [`ParseError`].
//!
//! # Example
//!
//! ```
//! # use threatmap_yaml::error::{Diagnostic, ErrorCode};
//! # use threatmap_yaml::Span;
//!
//! let diag = Diagnostic::warning("ref `db` is defined multiple times")
//!     .with_code(ErrorCode::E201)
//!     .with_label(Span::new(120..127), "duplicate ref")
//!     .with_secondary_label(Span::new(40..47), "first defined here")
//!     .with_help("run `threatmap regenerate` to derive unique refs");
//! ```

mod diagnostic;
mod error_code;
mod label;
mod parse_error;
mod severity;

pub use diagnostic::Diagnostic;
pub use error_code::ErrorCode;
pub use label::Label;
pub use parse_error::ParseError;
pub use severity::Severity;
