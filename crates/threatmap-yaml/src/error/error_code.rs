//! Error codes for Threatmap diagnostics.
//!
//! Error codes are organized by family:
//! - `E0xx` - YAML syntax errors
//! - `E1xx` - Document structure errors
//! - `E2xx` - Reference integrity warnings

use std::fmt;

/// Error codes for categorizing diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // =========================================================================
    // Syntax Errors (E0xx)
    // =========================================================================
    /// Invalid YAML syntax.
    ///
    /// The text is not well-formed YAML, e.g. a mapping value where none is
    /// allowed or a block that is indented inconsistently.
    E001,

    /// Empty document.
    ///
    /// The input contains no YAML content at all.
    E002,

    // =========================================================================
    // Structure Errors (E1xx)
    // =========================================================================
    /// Missing required field.
    ///
    /// `schema_version`, `name` and `components` are mandatory at the top
    /// level, and every entity needs its `ref` (and `name`, or
    /// `source`/`destination` for data flows).
    E100,

    /// Invalid field type.
    ///
    /// A field holds a value of the wrong shape, e.g. a mapping where a list
    /// is expected.
    E101,

    /// Unknown enum value.
    ///
    /// `component_type` or `direction` holds a value outside its allowed set.
    E102,

    // =========================================================================
    // Reference Warnings (E2xx)
    // =========================================================================
    /// Undefined reference.
    ///
    /// A relationship field names a ref that no entity of the expected kind
    /// carries.
    E200,

    /// Duplicate ref.
    ///
    /// Two entities of the same collection share a ref.
    E201,
}

impl ErrorCode {
    /// Returns the numeric code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E001 => "E001",
            ErrorCode::E002 => "E002",
            ErrorCode::E100 => "E100",
            ErrorCode::E101 => "E101",
            ErrorCode::E102 => "E102",
            ErrorCode::E200 => "E200",
            ErrorCode::E201 => "E201",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E001 => "invalid yaml syntax",
            ErrorCode::E002 => "empty document",
            ErrorCode::E100 => "missing required field",
            ErrorCode::E101 => "invalid field type",
            ErrorCode::E102 => "unknown enum value",
            ErrorCode::E200 => "undefined reference",
            ErrorCode::E201 => "duplicate ref",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::E001.to_string(), "E001");
        assert_eq!(ErrorCode::E100.to_string(), "E100");
        assert_eq!(ErrorCode::E201.to_string(), "E201");
    }

    #[test]
    fn test_error_code_description() {
        assert_eq!(ErrorCode::E002.description(), "empty document");
        assert_eq!(ErrorCode::E200.description(), "undefined reference");
    }
}
