//! The YAML layer of Threatmap.
//!
//! A threat model lives on disk as a YAML document that people edit by hand,
//! so this crate never re-serializes it. It provides:
//!
//! - [`parse`]: YAML text to [`ThreatModel`](threatmap_core::model::ThreatModel),
//!   with [`error::Diagnostic`]s on failure
//! - [`validate`]: duplicate-ref and dangling-reference warnings
//! - [`patch`]: line-local edits that keep comments and layout intact
//! - [`regenerate`]: rebuilding every ref from the current names
//!
//! # Examples
//!
//! ```
//! use threatmap_yaml::{parse, patch, scalar::Value};
//!
//! let src = "schema_version: '1.0'\nname: Demo\ncomponents:\n  - ref: api\n    name: API\n";
//! let model = parse(src).unwrap();
//! assert_eq!(model.components[0].name, "API");
//!
//! let edited = patch::update_field(src, "components", "api", "x", &Value::Number(120.0));
//! assert!(edited.ends_with("    name: API\n    x: 120\n"));
//! ```

pub mod error;
pub mod patch;
pub mod regenerate;
pub mod scalar;

mod outline;
mod parse;
mod span;
mod validate;

pub use parse::parse;
pub use regenerate::{Regeneration, regenerate_all_refs};
pub use span::Span;
pub use validate::validate;
