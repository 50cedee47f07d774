//! Rebuilding every ref from the current names.
//!
//! New refs are computed from the parsed model, then substituted back into
//! the original text line by line, so comments and layout survive. Each
//! kind of entity gets its own substitution table, and each rewritten line
//! is matched against one alternation of all old refs (longest first) and
//! looked up in the table once, so a rename is never applied to the output
//! of another rename.

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{debug, info};
use regex::{Captures, Regex};

use threatmap_core::{
    identifier::{disambiguate, slugify},
    model::{EntityKind, RELATIONSHIPS},
};

use crate::{
    error::ParseError,
    outline::{Edit, Field, Lines, ListForm, Outline},
    parse,
    scalar::{quote_if_needed, render_flow_element},
};

/// One ref that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRename {
    pub kind: EntityKind,
    pub old: String,
    pub new: String,
}

/// The result of [`regenerate_all_refs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regeneration {
    /// The rewritten document.
    pub yaml: String,
    /// Every entity's old and new ref, in document order. Unchanged refs
    /// are included.
    pub renames: Vec<RefRename>,
}

impl Regeneration {
    /// Renames whose ref actually changed.
    pub fn changed(&self) -> impl Iterator<Item = &RefRename> {
        self.renames.iter().filter(|r| r.old != r.new)
    }
}

/// Derives a fresh ref for every entity from its name and rewrites the
/// document to match.
///
/// Named entities are processed in the order components, boundaries,
/// assets, threats, controls; data flows come last and are built from
/// their endpoints' new refs and their direction. All refs share one
/// namespace; collisions get `-2`, `-3`, ... appended.
pub fn regenerate_all_refs(yaml: &str) -> Result<Regeneration, ParseError> {
    let model = parse(yaml)?;

    let mut taken: HashSet<String> = HashSet::new();
    let mut tables: IndexMap<EntityKind, IndexMap<String, String>> = IndexMap::new();
    let mut renames = Vec::new();

    for kind in EntityKind::ALL {
        if kind == EntityKind::DataFlow {
            continue;
        }
        let table = tables.entry(kind).or_default();
        for (old, name) in model.names(kind) {
            let slug = slugify(name.unwrap_or_default());
            let base = if slug.is_empty() {
                slug_fallback(kind).to_string()
            } else {
                slug
            };
            let new = disambiguate(&base, &taken, '-');
            taken.insert(new.clone());
            table.entry(old.to_string()).or_insert_with(|| new.clone());
            renames.push(RefRename {
                kind,
                old: old.to_string(),
                new,
            });
        }
    }

    let components = tables.get(&EntityKind::Component).cloned().unwrap_or_default();
    let mut flow_table = IndexMap::new();
    for flow in model.data_flows() {
        let source = components.get(&flow.source).unwrap_or(&flow.source);
        let destination = components.get(&flow.destination).unwrap_or(&flow.destination);
        let base = format!("{source}{}{destination}", flow.direction.arrow());
        let new = disambiguate(&base, &taken, '-');
        taken.insert(new.clone());
        flow_table
            .entry(flow.r#ref.clone())
            .or_insert_with(|| new.clone());
        renames.push(RefRename {
            kind: EntityKind::DataFlow,
            old: flow.r#ref.clone(),
            new,
        });
    }
    tables.insert(EntityKind::DataFlow, flow_table);

    let yaml = rewrite(yaml, &tables);
    let changed = renames.iter().filter(|r| r.old != r.new).count();
    info!(entities = renames.len(), changed; "Regenerated refs");
    Ok(Regeneration { yaml, renames })
}

fn slug_fallback(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Component => "component",
        EntityKind::Boundary => "boundary",
        EntityKind::Asset => "asset",
        EntityKind::Threat => "threat",
        EntityKind::Control => "control",
        EntityKind::DataFlow => "data-flow",
    }
}

/// Compiled substitution patterns for one entity kind.
struct Substitution<'t> {
    table: &'t IndexMap<String, String>,
    /// `ref: X`, `source: X`, `destination: X` and `- X` lines.
    anchored: Regex,
    /// Elements inside `[...]`.
    element: Regex,
}

impl<'t> Substitution<'t> {
    fn new(table: &'t IndexMap<String, String>) -> Option<Self> {
        let mut olds: Vec<&str> = table
            .iter()
            .filter(|(old, new)| old != new)
            .map(|(old, _)| old.as_str())
            .collect();
        if olds.is_empty() {
            return None;
        }
        olds.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = olds
            .iter()
            .map(|old| regex::escape(old))
            .collect::<Vec<_>>()
            .join("|");

        let anchored = Regex::new(&format!(
            r#"^(\s*(?:-\s+)?(?:[A-Za-z_]+:\s*)?)(["']?)({alternation})(["']?)(\s*(?:#.*)?)$"#
        ))
        .ok()?;
        let element = Regex::new(&format!(r#"(["']?)({alternation})(["']?)"#)).ok()?;
        Some(Self {
            table,
            anchored,
            element,
        })
    }

    /// Rewrites the scalar of a whole line, or returns `None` when the line
    /// holds no old ref.
    fn rewrite_line(&self, line: &str) -> Option<String> {
        let caps = self.anchored.captures(line)?;
        let (open, close) = (&caps[2], &caps[4]);
        if open != close {
            return None;
        }
        let new = self.table.get(&caps[3])?;
        let rendered = if open.is_empty() {
            quote_if_needed(new)
        } else {
            format!("{open}{new}{close}")
        };
        Some(format!("{}{rendered}{}", &caps[1], &caps[5]))
    }

    /// Rewrites the elements of the flow sequence on `line`.
    fn rewrite_inline(&self, line: &str) -> Option<String> {
        let open = line.find('[')?;
        let close = line.rfind(']')?;
        if close < open {
            return None;
        }
        let inner = &line[open + 1..close];
        let replaced = self.element.replace_all(inner, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let Some(range) = caps.get(0).map(|m| m.range()) else {
                return whole.to_string();
            };
            let before = inner[..range.start].trim_end();
            let after = inner[range.end..].trim_start();
            let bounded = (before.is_empty() || before.ends_with(','))
                && (after.is_empty() || after.starts_with(','));
            if !bounded || caps[1] != caps[3] {
                return whole.to_string();
            }
            match self.table.get(&caps[2]) {
                Some(new) if caps[1].is_empty() => render_flow_element(new),
                Some(new) => format!("{}{new}{}", &caps[1], &caps[3]),
                None => whole.to_string(),
            }
        });
        if replaced == inner {
            return None;
        }
        Some(format!("{}[{replaced}]{}", &line[..open], &line[close + 1..]))
    }
}

fn rewrite(yaml: &str, tables: &IndexMap<EntityKind, IndexMap<String, String>>) -> String {
    let substitutions: IndexMap<EntityKind, Substitution<'_>> = tables
        .iter()
        .filter_map(|(kind, table)| Substitution::new(table).map(|s| (*kind, s)))
        .collect();
    if substitutions.is_empty() {
        return yaml.to_string();
    }

    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);
    let mut edits = Vec::new();
    let mut push = |line: usize, rewritten: Option<String>| {
        if let Some(text) = rewritten {
            edits.push(Edit::replace(line, text));
        }
    };

    for section in &outline.sections {
        let Ok(owner) = section.key().parse::<EntityKind>() else {
            continue;
        };
        for item in &section.items {
            for field in &item.fields {
                let target = match field.key() {
                    "ref" => Some(owner),
                    key => RELATIONSHIPS
                        .iter()
                        .find(|rel| rel.owner == owner && rel.field == key)
                        .map(|rel| rel.target),
                };
                let Some(substitution) = target.and_then(|kind| substitutions.get(&kind)) else {
                    continue;
                };
                rewrite_field(&lines, field, substitution, &mut push);
            }
        }
    }

    debug!(lines = edits.len(); "Rewriting lines");
    lines.splice(edits)
}

fn rewrite_field(
    lines: &Lines<'_>,
    field: &Field,
    substitution: &Substitution<'_>,
    push: &mut impl FnMut(usize, Option<String>),
) {
    match field.list(lines) {
        Some(ListForm::Inline(_)) => {
            push(field.line, substitution.rewrite_inline(lines.content(field.line)));
        }
        Some(ListForm::Block(elements)) => {
            for (line, _, _) in elements {
                push(line, substitution.rewrite_line(lines.content(line)));
            }
        }
        None => {
            push(field.line, substitution.rewrite_line(lines.content(field.line)));
        }
    }
}
