//! Referential-integrity checks.
//!
//! Dangling references are legal in a document (they render as raw refs),
//! so everything reported here is a [`Severity::Warning`](crate::error::Severity).

use std::collections::HashMap;

use log::debug;

use threatmap_core::model::{EntityKind, ThreatModel};

use crate::{
    error::{Diagnostic, ErrorCode},
    outline::{Lines, ListForm, Outline},
    span::Span,
};

/// Checks `model` (parsed from `src`) for duplicate refs and for
/// relationship fields that point at nothing.
pub fn validate(src: &str, model: &ThreatModel) -> Vec<Diagnostic> {
    let lines = Lines::new(src);
    let outline = Outline::parse(&lines);
    let mut diagnostics = duplicate_refs(src, &outline, model);

    for dangling in model.dangling_references() {
        let mut diag = Diagnostic::warning(format!(
            "{} `{}` references unknown {} `{}` in `{}`",
            dangling.owner,
            dangling.owner_ref,
            target_kind(dangling.owner, dangling.field),
            dangling.target,
            dangling.field,
        ))
        .with_code(ErrorCode::E200)
        .with_help("remove the entry or add the missing entity");

        if let Some(span) = reference_span(src, &lines, &outline, &dangling) {
            diag = diag.with_label(span, "not defined");
        }
        diagnostics.push(diag);
    }

    debug!(count = diagnostics.len(); "Validation finished");
    diagnostics
}

fn target_kind(owner: EntityKind, field: &str) -> EntityKind {
    threatmap_core::model::RELATIONSHIPS
        .iter()
        .find(|rel| rel.owner == owner && rel.field == field)
        .map_or(EntityKind::Component, |rel| rel.target)
}

fn duplicate_refs(src: &str, outline: &Outline, model: &ThreatModel) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for kind in EntityKind::ALL {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let items = outline
            .section(kind.collection())
            .map(|s| s.items.as_slice())
            .unwrap_or_default();

        for (idx, entity_ref) in model.refs(kind).into_iter().enumerate() {
            let Some(first) = first_seen.get(entity_ref).copied() else {
                first_seen.insert(entity_ref, idx);
                continue;
            };
            let mut diag = Diagnostic::warning(format!(
                "{kind} ref `{entity_ref}` is defined multiple times"
            ))
            .with_code(ErrorCode::E201)
            .with_help("refs must be unique; `threatmap regenerate` derives unique refs from names");
            if let Some(item) = items.get(idx) {
                diag = diag.with_label(Span::of_line(src, item.start), "duplicate ref");
            }
            if let Some(item) = items.get(first) {
                diag = diag.with_secondary_label(Span::of_line(src, item.start), "first defined here");
            }
            diagnostics.push(diag);
        }
    }
    diagnostics
}

fn reference_span(
    src: &str,
    lines: &Lines<'_>,
    outline: &Outline,
    dangling: &threatmap_core::model::DanglingReference,
) -> Option<Span> {
    let item = outline.item(dangling.owner.collection(), &dangling.owner_ref)?;
    let field = item.field(dangling.field)?;
    let line = match field.list(lines) {
        Some(ListForm::Block(elements)) => elements
            .iter()
            .find(|(_, raw, _)| crate::scalar::unquote(raw) == dangling.target)
            .map_or(field.line, |(line, _, _)| *line),
        _ => field.line,
    };
    Some(Span::of_line(src, line))
}
