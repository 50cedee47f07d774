//! Format-preserving edits of a threat-model document.
//!
//! Every function takes the current YAML text and returns the edited text.
//! Only the lines that carry the change are rewritten; comments, key order
//! and blank lines elsewhere come back byte-identical. When the target of a
//! patch cannot be located the input is returned unchanged.
//!
//! # Examples
//!
//! ```
//! use threatmap_yaml::{patch, scalar::Value};
//!
//! let yaml = "components:\n  - ref: api  # edge\n    name: API\n    y: 10\n";
//! let out = patch::update_field(yaml, "components", "api", "y", &Value::Number(200.0));
//! assert_eq!(out, "components:\n  - ref: api  # edge\n    name: API\n    y: 200\n");
//! ```

use log::{debug, trace};

use crate::{
    outline::{Edit, Field, Lines, ListForm, Outline},
    scalar::{Value, quote_if_needed, render_flow_element, unquote},
};

/// Sets `field` of the item `ref` in `collection`.
///
/// An existing field line is rewritten in place, keeping its trailing
/// comment. A missing field is inserted after the item's last line.
pub fn update_field(yaml: &str, collection: &str, r#ref: &str, field: &str, value: &Value) -> String {
    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);
    let Some(item) = outline.item(collection, r#ref) else {
        debug!(collection, entity_ref = r#ref, field; "Patch target not found");
        return yaml.to_string();
    };

    let edit = match item.field(field) {
        Some(existing) => {
            let content = lines.content(existing.line);
            let prefix = &content[..existing.key_line.key_col];
            Edit {
                range: existing.line..existing.end,
                lines: vec![format!(
                    "{prefix}{field}: {}{}",
                    value.render(),
                    existing.key_line.comment
                )],
            }
        }
        None => Edit::insert(
            item.end,
            vec![format!(
                "{}{field}: {}",
                " ".repeat(item.field_indent),
                value.render()
            )],
        ),
    };
    trace!(collection, entity_ref = r#ref, field; "Updating field");
    lines.splice(vec![edit])
}

/// Removes `field` from the item `ref`. The `ref` line itself is never removed.
pub fn remove_field(yaml: &str, collection: &str, r#ref: &str, field: &str) -> String {
    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);
    let Some(item) = outline.item(collection, r#ref) else {
        return yaml.to_string();
    };
    match item.field(field) {
        Some(existing) if existing.line != item.start => {
            lines.splice(vec![Edit::delete(existing.line..existing.end)])
        }
        _ => yaml.to_string(),
    }
}

/// Writes a relationship list as an inline flow sequence, replacing any
/// existing inline or block list.
pub fn set_list_field(
    yaml: &str,
    collection: &str,
    r#ref: &str,
    field: &str,
    values: &[String],
) -> String {
    update_field(yaml, collection, r#ref, field, &Value::List(values.to_vec()))
}

/// Appends a new item to `collection`.
///
/// `fields` are written in order; the first one shares the `- ` line. A
/// missing collection is added at the end of the document, and `key: []`
/// becomes a block list.
pub fn append_item(yaml: &str, collection: &str, fields: &[(&str, Value)]) -> String {
    let Some(((first_key, first_value), rest)) = fields.split_first() else {
        return yaml.to_string();
    };
    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);

    let render_item = |indent: usize, field_indent: usize| -> Vec<String> {
        let mut out = vec![format!(
            "{}- {first_key}: {}",
            " ".repeat(indent),
            first_value.render()
        )];
        out.extend(rest.iter().map(|(key, value)| {
            format!("{}{key}: {}", " ".repeat(field_indent), value.render())
        }));
        out
    };

    let edit = match outline.section(collection) {
        Some(section) => match section.items.last() {
            Some(last) => Edit::insert(section.end, render_item(last.indent, last.field_indent)),
            None => {
                let mut new_lines = vec![format!("{collection}:{}", section.key_line.comment)];
                new_lines.extend(render_item(2, 4));
                Edit {
                    range: section.line..section.line + 1,
                    lines: new_lines,
                }
            }
        },
        None => {
            let mut new_lines = vec![format!("{collection}:")];
            new_lines.extend(render_item(2, 4));
            Edit::insert(lines.len(), new_lines)
        }
    };
    debug!(collection; "Appending item");
    lines.splice(vec![edit])
}

/// Removes the item `ref` from `collection`.
///
/// Removing the last item leaves `key: []` so the collection stays a list.
pub fn remove_item(yaml: &str, collection: &str, r#ref: &str) -> String {
    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);
    let Some(section) = outline.section(collection) else {
        return yaml.to_string();
    };
    let Some(item) = section.item(r#ref) else {
        return yaml.to_string();
    };

    let mut edits = vec![Edit::delete(item.start..item.end)];
    if section.items.len() == 1 {
        edits.push(Edit::replace(
            section.line,
            format!("{collection}: []{}", section.key_line.comment),
        ));
    }
    debug!(collection, entity_ref = r#ref; "Removing item");
    lines.splice(edits)
}

/// Rewrites the `ref:` line of item `old` in `collection` to `new`. Refs in
/// other collections are left alone even when they share the value.
pub fn rename_ref(yaml: &str, collection: &str, old: &str, new: &str) -> String {
    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);
    let Some(field) = outline
        .item(collection, old)
        .and_then(|item| item.field("ref"))
    else {
        return yaml.to_string();
    };
    debug!(collection, old, new; "Renaming item");
    lines.splice(vec![rewrite_scalar_line(&lines, field, new)])
}

/// Replaces `old` with `new` inside the array fields named in `fields`.
pub fn replace_in_arrays(yaml: &str, fields: &[&str], old: &str, new: &str) -> String {
    edit_arrays(yaml, fields, |element| {
        if element == old {
            ElementAction::Replace(new.to_string())
        } else {
            ElementAction::Keep
        }
    })
}

/// Removes `ref` from the array fields named in `fields`, across all
/// collections. A block list that becomes empty is rewritten as `key: []`.
pub fn strip_ref_from_arrays(yaml: &str, fields: &[&str], r#ref: &str) -> String {
    edit_arrays(yaml, fields, |element| {
        if element == r#ref {
            ElementAction::Remove
        } else {
            ElementAction::Keep
        }
    })
}

enum ElementAction {
    Keep,
    Remove,
    Replace(String),
}

fn edit_arrays(yaml: &str, fields: &[&str], decide: impl Fn(&str) -> ElementAction) -> String {
    let lines = Lines::new(yaml);
    let outline = Outline::parse(&lines);
    let mut edits = Vec::new();

    for (_, field) in outline.item_fields(fields) {
        match field.list(&lines) {
            Some(ListForm::Inline(elements)) => {
                let mut changed = false;
                let mut kept = Vec::with_capacity(elements.len());
                for raw in elements {
                    match decide(&unquote(&raw)) {
                        ElementAction::Keep => kept.push(raw),
                        ElementAction::Remove => changed = true,
                        ElementAction::Replace(new) => {
                            changed = true;
                            kept.push(render_flow_element(&new));
                        }
                    }
                }
                if changed {
                    let content = lines.content(field.line);
                    let prefix = &content[..field.key_line.key_col];
                    edits.push(Edit::replace(
                        field.line,
                        format!(
                            "{prefix}{}: [{}]{}",
                            field.key(),
                            kept.join(", "),
                            field.key_line.comment
                        ),
                    ));
                }
            }
            Some(ListForm::Block(elements)) => {
                let mut removed = Vec::new();
                let mut element_edits = Vec::new();
                for (line, raw, comment) in &elements {
                    match decide(&unquote(raw)) {
                        ElementAction::Keep => {}
                        ElementAction::Remove => removed.push(*line),
                        ElementAction::Replace(new) => {
                            let content = lines.content(*line);
                            let dash = content.len() - content.trim_start().len();
                            element_edits.push(Edit::replace(
                                *line,
                                format!("{}- {}{comment}", &content[..dash], quote_if_needed(&new)),
                            ));
                        }
                    }
                }
                if !elements.is_empty() && removed.len() == elements.len() {
                    let content = lines.content(field.line);
                    let prefix = &content[..field.key_line.key_col];
                    edits.push(Edit {
                        range: field.line..field.end,
                        lines: vec![format!(
                            "{prefix}{}: []{}",
                            field.key(),
                            field.key_line.comment
                        )],
                    });
                } else {
                    edits.extend(removed.into_iter().map(|line| Edit::delete(line..line + 1)));
                    edits.extend(element_edits);
                }
            }
            None => {}
        }
    }

    if edits.is_empty() {
        return yaml.to_string();
    }
    lines.splice(edits)
}

/// Rewrites the scalar value of a single-line field, keeping its prefix,
/// quote style and comment.
fn rewrite_scalar_line(lines: &Lines<'_>, field: &Field, new: &str) -> Edit {
    let content = lines.content(field.line);
    let prefix = &content[..field.key_line.key_col];
    let raw = field.key_line.value.as_str();
    let rendered = if raw.starts_with('\'') && !new.contains('\'') {
        format!("'{new}'")
    } else if raw.starts_with('"') {
        render_double_quoted(new)
    } else {
        quote_if_needed(new)
    };
    Edit::replace(
        field.line,
        format!("{prefix}{}: {rendered}{}", field.key(), field.key_line.comment),
    )
}

fn render_double_quoted(s: &str) -> String {
    let quoted = quote_if_needed(s);
    if quoted.starts_with('"') {
        quoted
    } else {
        format!("\"{s}\"")
    }
}

/// One queued patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    UpdateField {
        collection: String,
        r#ref: String,
        field: String,
        value: Value,
    },
    RemoveField {
        collection: String,
        r#ref: String,
        field: String,
    },
    AppendItem {
        collection: String,
        fields: Vec<(String, Value)>,
    },
    RemoveItem {
        collection: String,
        r#ref: String,
    },
    RenameRef {
        collection: String,
        old: String,
        new: String,
    },
    ReplaceInArrays {
        fields: Vec<String>,
        old: String,
        new: String,
    },
    StripRef {
        fields: Vec<String>,
        r#ref: String,
    },
}

impl Patch {
    pub fn apply(&self, yaml: &str) -> String {
        match self {
            Patch::UpdateField {
                collection,
                r#ref,
                field,
                value,
            } => update_field(yaml, collection, r#ref, field, value),
            Patch::RemoveField {
                collection,
                r#ref,
                field,
            } => remove_field(yaml, collection, r#ref, field),
            Patch::AppendItem { collection, fields } => {
                let fields: Vec<(&str, Value)> = fields
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.clone()))
                    .collect();
                append_item(yaml, collection, &fields)
            }
            Patch::RemoveItem { collection, r#ref } => remove_item(yaml, collection, r#ref),
            Patch::RenameRef {
                collection,
                old,
                new,
            } => rename_ref(yaml, collection, old, new),
            Patch::ReplaceInArrays { fields, old, new } => {
                let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                replace_in_arrays(yaml, &fields, old, new)
            }
            Patch::StripRef { fields, r#ref } => {
                let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                strip_ref_from_arrays(yaml, &fields, r#ref)
            }
        }
    }
}

/// An ordered group of patches applied as one text transition.
///
/// ```
/// use threatmap_yaml::{patch::Batch, scalar::Value};
///
/// let yaml = "components:\n  - ref: a\n    name: A\n";
/// let out = Batch::new()
///     .update_field("components", "a", "x", Value::Number(10.0))
///     .update_field("components", "a", "y", Value::Number(20.0))
///     .apply(yaml);
/// assert_eq!(out, "components:\n  - ref: a\n    name: A\n    x: 10\n    y: 20\n");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    patches: Vec<Patch>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn push(&mut self, patch: Patch) -> &mut Self {
        self.patches.push(patch);
        self
    }

    pub fn update_field(
        mut self,
        collection: &str,
        r#ref: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Self {
        self.patches.push(Patch::UpdateField {
            collection: collection.to_string(),
            r#ref: r#ref.to_string(),
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn remove_field(mut self, collection: &str, r#ref: &str, field: &str) -> Self {
        self.patches.push(Patch::RemoveField {
            collection: collection.to_string(),
            r#ref: r#ref.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn append_item(mut self, collection: &str, fields: Vec<(String, Value)>) -> Self {
        self.patches.push(Patch::AppendItem {
            collection: collection.to_string(),
            fields,
        });
        self
    }

    pub fn remove_item(mut self, collection: &str, r#ref: &str) -> Self {
        self.patches.push(Patch::RemoveItem {
            collection: collection.to_string(),
            r#ref: r#ref.to_string(),
        });
        self
    }

    pub fn rename_ref(mut self, collection: &str, old: &str, new: &str) -> Self {
        self.patches.push(Patch::RenameRef {
            collection: collection.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        });
        self
    }

    pub fn replace_in_arrays(mut self, fields: &[&str], old: &str, new: &str) -> Self {
        self.patches.push(Patch::ReplaceInArrays {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            old: old.to_string(),
            new: new.to_string(),
        });
        self
    }

    pub fn strip_ref(mut self, fields: &[&str], r#ref: &str) -> Self {
        self.patches.push(Patch::StripRef {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            r#ref: r#ref.to_string(),
        });
        self
    }

    /// Applies every patch in order and returns the final text.
    pub fn apply(&self, yaml: &str) -> String {
        self.patches
            .iter()
            .fold(yaml.to_string(), |text, patch| patch.apply(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_refs(yaml: &str, collection: &str) -> Vec<(String, usize)> {
        let lines = Lines::new(yaml);
        let outline = Outline::parse(&lines);
        outline
            .section(collection)
            .map(|section| {
                section
                    .items
                    .iter()
                    .filter_map(|item| item.ref_value().map(|r| (r, item.start)))
                    .collect()
            })
            .unwrap_or_default()
    }

    const DOC: &str = "\
# Threat model for the shop
schema_version: '1.0'
name: Shop

components:
  - ref: api   # public entry
    name: API
    component_type: internal
    x: 100
    y: 100

  - ref: db
    name: Database
    component_type: data_store

data_flows:
  - ref: api->db
    source: api
    destination: db
    label: DF1

boundaries:
  - ref: backend
    name: Backend
    components:
      - api
      - db  # storage

threats:
  - ref: T01
    name: SQL injection
    affected_components: [api, db]
    affected_data_flows: [api->db]
";

    #[test]
    fn test_update_field_is_local() {
        let out = update_field(DOC, "components", "api", "y", &Value::Number(200.0));
        let before: Vec<&str> = DOC.lines().collect();
        let after: Vec<&str> = out.lines().collect();
        assert_eq!(before.len(), after.len());
        for (idx, (b, a)) in before.iter().zip(&after).enumerate() {
            if idx == 9 {
                assert_eq!(*a, "    y: 200");
            } else {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_update_field_keeps_comment() {
        let out = update_field(DOC, "components", "api", "name", &Value::text("Gateway"));
        assert!(out.contains("    name: Gateway\n"));
        let out = update_field(DOC, "components", "api", "ref", &Value::text("gw"));
        assert!(out.contains("  - ref: gw   # public entry\n"));
    }

    #[test]
    fn test_update_missing_field_inserts_after_item() {
        let out = update_field(DOC, "components", "db", "x", &Value::Number(300.0));
        assert!(out.contains("    component_type: data_store\n    x: 300\n\ndata_flows:"));
    }

    #[test]
    fn test_update_missing_target_is_noop() {
        assert_eq!(
            update_field(DOC, "components", "nope", "x", &Value::Number(1.0)),
            DOC
        );
        assert_eq!(
            update_field(DOC, "controls", "C01", "name", &Value::text("x")),
            DOC
        );
    }

    #[test]
    fn test_remove_field() {
        let out = remove_field(DOC, "data_flows", "api->db", "label");
        assert!(!out.contains("label: DF1"));
        assert_eq!(remove_field(DOC, "data_flows", "api->db", "ref"), DOC);
    }

    #[test]
    fn test_set_list_field_replaces_block_list() {
        let out = set_list_field(
            DOC,
            "boundaries",
            "backend",
            "components",
            &["api".to_string()],
        );
        assert!(out.contains("    components: [api]\n\nthreats:"));
        assert!(!out.contains("      - db"));
    }

    #[test]
    fn test_append_item_matches_indentation() {
        let out = append_item(
            DOC,
            "components",
            &[
                ("ref", Value::text("cache")),
                ("name", Value::text("Cache")),
                ("x", Value::Number(400.0)),
            ],
        );
        assert!(out.contains(
            "    component_type: data_store\n  - ref: cache\n    name: Cache\n    x: 400\n\ndata_flows:"
        ));
    }

    #[test]
    fn test_append_item_creates_collection() {
        let out = append_item(
            DOC,
            "controls",
            &[("ref", Value::text("C01")), ("name", Value::text("WAF"))],
        );
        assert!(out.starts_with(DOC));
        assert!(out.ends_with("controls:\n  - ref: C01\n    name: WAF\n"));
    }

    #[test]
    fn test_append_item_to_empty_flow_list() {
        let yaml = "name: x\nassets: []  # none yet\n";
        let out = append_item(yaml, "assets", &[("ref", Value::text("A01"))]);
        assert_eq!(out, "name: x\nassets:  # none yet\n  - ref: A01\n");
    }

    #[test]
    fn test_remove_item() {
        let out = remove_item(DOC, "components", "api");
        assert!(!out.contains("ref: api   #"));
        assert!(out.contains("components:\n\n  - ref: db"));

        let out = remove_item(DOC, "data_flows", "api->db");
        assert!(out.contains("data_flows: []\n"));
    }

    #[test]
    fn test_rename_ref() {
        let out = rename_ref(DOC, "components", "db", "database");
        assert!(out.contains("  - ref: database\n"));
        // only `ref:` values change
        assert!(out.contains("    destination: db\n"));
        assert_eq!(rename_ref(DOC, "assets", "db", "database"), DOC);
    }

    #[test]
    fn test_rename_ref_stays_in_collection() {
        let yaml = "components:\n  - ref: shared\n    name: A\nassets:\n  - ref: shared\n    name: B\n";
        let out = rename_ref(yaml, "assets", "shared", "records");
        assert_eq!(
            out,
            "components:\n  - ref: shared\n    name: A\nassets:\n  - ref: records\n    name: B\n"
        );
    }

    #[test]
    fn test_strip_ref_from_arrays() {
        let fields = ["components", "affected_components", "implemented_in"];
        let out = strip_ref_from_arrays(DOC, &fields, "db");
        assert!(out.contains("    components:\n      - api\n\nthreats:"));
        assert!(out.contains("    affected_components: [api]\n"));
        // the top-level `components:` collection is not an array field
        assert!(out.contains("  - ref: db\n"));

        let out = strip_ref_from_arrays(&out, &fields, "api");
        assert!(out.contains("    components: []\n"));
        assert!(out.contains("    affected_components: []\n"));
    }

    #[test]
    fn test_replace_in_arrays() {
        let out = replace_in_arrays(DOC, &["affected_data_flows"], "api->db", "api<->db");
        assert!(out.contains("    affected_data_flows: [api<->db]\n"));

        let out = replace_in_arrays(DOC, &["components"], "db", "store");
        assert!(out.contains("      - store  # storage\n"));
    }

    #[test]
    fn test_batch_applies_in_order() {
        let out = Batch::new()
            .remove_item("data_flows", "api->db")
            .strip_ref(&["affected_data_flows"], "api->db")
            .apply(DOC);
        assert!(out.contains("data_flows: []"));
        assert!(out.contains("    affected_data_flows: []\n"));
        assert_eq!(item_refs(&out, "threats"), vec![("T01".to_string(), 25)]);
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        // =====================================================================
        // Strategies
        // =====================================================================

        fn coordinate_strategy() -> impl Strategy<Value = f64> {
            (-5000i32..5000).prop_map(f64::from)
        }

        fn name_strategy() -> impl Strategy<Value = String> {
            "[A-Za-z0-9 _:#'\"-]{0,24}"
        }

        // =====================================================================
        // Property Test Functions
        // =====================================================================

        fn check_update_touches_one_line(field: &str, value: Value) -> Result<(), TestCaseError> {
            let out = update_field(DOC, "components", "api", field, &value);
            let before: Vec<&str> = DOC.lines().collect();
            let after: Vec<&str> = out.lines().collect();
            prop_assert_eq!(before.len(), after.len());
            let changed = before.iter().zip(&after).filter(|(b, a)| b != a).count();
            prop_assert!(changed <= 1);
            Ok(())
        }

        fn check_numbers_never_quoted(y: f64) -> Result<(), TestCaseError> {
            let out = update_field(DOC, "components", "api", "y", &Value::Number(y));
            let expected = format!("    y: {}\n", y as i64);
            prop_assert!(out.contains(&expected));
            Ok(())
        }

        // =====================================================================
        // Proptest Wrappers
        // =====================================================================

        proptest! {
            #[test]
            fn update_touches_one_line(name in name_strategy()) {
                check_update_touches_one_line("name", Value::Text(name))?;
            }

            #[test]
            fn coordinate_update_touches_one_line(x in coordinate_strategy()) {
                check_update_touches_one_line("x", Value::Number(x))?;
            }

            #[test]
            fn numbers_never_quoted(y in coordinate_strategy()) {
                check_numbers_never_quoted(y)?;
            }
        }
    }
}
