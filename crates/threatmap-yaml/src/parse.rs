//! Reading a YAML document into a [`ThreatModel`].

use log::{debug, info};

use threatmap_core::model::ThreatModel;

use crate::{
    error::{Diagnostic, ErrorCode, ParseError},
    outline::is_trivia,
    span::Span,
};

/// Parses `src` into a model.
///
/// Syntax and structure problems are reported as a [`ParseError`] carrying
/// one diagnostic with the offending line labelled. Dangling references are
/// tolerated here; see [`crate::validate`].
pub fn parse(src: &str) -> Result<ThreatModel, ParseError> {
    if src.lines().all(is_trivia) {
        return Err(Diagnostic::error("document is empty")
            .with_code(ErrorCode::E002)
            .with_label(Span::new(0..src.len()), "no content")
            .with_help("a document needs at least `schema_version`, `name` and `components`")
            .into());
    }

    let model = serde_yaml::from_str::<ThreatModel>(src).map_err(|err| {
        let diag = yaml_error_to_diagnostic(src, &err);
        debug!(diagnostic:% = diag; "Failed to parse document");
        ParseError::from(diag)
    })?;

    info!(
        components = model.components.len(),
        data_flows = model.data_flows().len(),
        boundaries = model.boundaries().len();
        "Document parsed"
    );
    Ok(model)
}

fn yaml_error_to_diagnostic(src: &str, err: &serde_yaml::Error) -> Diagnostic {
    let full = err.to_string();
    // serde_yaml appends " at line L column C"; the label already carries it
    let message = full
        .split(" at line ")
        .next()
        .unwrap_or(full.as_str())
        .to_string();

    let (code, label, help) = classify(&message);
    let mut diag = Diagnostic::error(message).with_code(code);
    if let Some(location) = err.location() {
        let line = location.line().saturating_sub(1);
        diag = diag.with_label(Span::of_line(src, line), label);
    }
    if let Some(help) = help {
        diag = diag.with_help(help);
    }
    diag
}

/// Picks a code from the serde message, which may be prefixed with the
/// path of the offending field (`components[0].component_type: ...`).
fn classify(message: &str) -> (ErrorCode, &'static str, Option<&'static str>) {
    if message.contains("missing field") {
        (
            ErrorCode::E100,
            "required field missing in this mapping",
            Some("`schema_version`, `name` and `components` are required at the top level"),
        )
    } else if message.contains("unknown variant") {
        (
            ErrorCode::E102,
            "unrecognized value",
            Some(
                "`component_type` is one of internal, external, data_store; \
                 `direction` is unidirectional or bidirectional",
            ),
        )
    } else if message.contains("invalid type")
        || message.contains("invalid value")
        || message.contains("invalid length")
        || message.contains("did not match any variant")
    {
        (ErrorCode::E101, "unexpected value here", None)
    } else {
        (ErrorCode::E001, "invalid yaml here", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let model = parse("schema_version: '1.0'\nname: Demo\ncomponents: []\n").unwrap();
        assert_eq!(model.schema_version, "1.0");
        assert_eq!(model.name, "Demo");
        assert!(model.components.is_empty());
        assert!(model.assets.is_none());
    }

    #[test]
    fn test_numeric_name_is_coerced() {
        let model = parse("schema_version: 1.0\nname: 2024\ncomponents: []\n").unwrap();
        assert_eq!(model.name, "2024");
        assert_eq!(model.schema_version, "1.0");
    }

    #[test]
    fn test_empty_document() {
        let err = parse("# nothing here\n\n").unwrap_err();
        assert_eq!(err.diagnostics()[0].code(), Some(ErrorCode::E002));
    }

    #[test]
    fn test_missing_components() {
        let err = parse("schema_version: '1.0'\nname: Demo\n").unwrap_err();
        let diag = &err.diagnostics()[0];
        assert_eq!(diag.code(), Some(ErrorCode::E100));
        assert!(diag.message().contains("components"));
    }

    #[test]
    fn test_unknown_component_type() {
        let src = "\
schema_version: '1.0'
name: Demo
components:
  - ref: a
    name: A
    component_type: mainframe
";
        let err = parse(src).unwrap_err();
        assert_eq!(err.diagnostics()[0].code(), Some(ErrorCode::E102));
    }

    #[test]
    fn test_syntax_error_has_label() {
        let src = "schema_version: '1.0'\nname: [unclosed\ncomponents: []\n";
        let err = parse(src).unwrap_err();
        let diag = &err.diagnostics()[0];
        assert_eq!(diag.code(), Some(ErrorCode::E001));
        assert_eq!(diag.labels().len(), 1);
    }
}
