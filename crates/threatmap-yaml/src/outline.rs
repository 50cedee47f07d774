//! A line-level outline of a threat-model document.
//!
//! The outline recognizes just enough YAML structure to edit a document
//! without re-serializing it: top-level keys ("sections"), the block list
//! items under them, each item's fields, and the list elements of array
//! fields. Everything is addressed by line index, and [`Lines::splice`]
//! rewrites whole lines while copying every untouched byte verbatim.

use std::{ops::Range, sync::LazyLock};

use regex::Regex;

use crate::scalar::{split_comment, split_flow_elements, unquote};

static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_-]*)[ \t]*:(?:[ \t]+(.*))?$").expect("valid regex")
});

/// The source split into lines, each keeping its terminator.
#[derive(Debug)]
pub(crate) struct Lines<'a> {
    lines: Vec<&'a str>,
    newline: &'static str,
}

/// Replace lines `range` with `lines` (given without terminators).
#[derive(Debug, Clone)]
pub(crate) struct Edit {
    pub range: Range<usize>,
    pub lines: Vec<String>,
}

impl Edit {
    pub fn replace(line: usize, text: String) -> Self {
        Self {
            range: line..line + 1,
            lines: vec![text],
        }
    }

    pub fn insert(at: usize, lines: Vec<String>) -> Self {
        Self {
            range: at..at,
            lines,
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self {
            range,
            lines: Vec::new(),
        }
    }
}

impl<'a> Lines<'a> {
    pub fn new(src: &'a str) -> Self {
        let newline = if src.contains("\r\n") { "\r\n" } else { "\n" };
        Self {
            lines: src.split_inclusive('\n').collect(),
            newline,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Line `idx` without its terminator.
    pub fn content(&self, idx: usize) -> &'a str {
        self.lines
            .get(idx)
            .map(|l| l.trim_end_matches(['\n', '\r']))
            .unwrap_or_default()
    }

    /// Applies non-overlapping edits and returns the new text.
    pub fn splice(&self, mut edits: Vec<Edit>) -> String {
        edits.sort_by_key(|e| (e.range.start, e.range.end));
        let extra: usize = edits
            .iter()
            .flat_map(|e| e.lines.iter())
            .map(|l| l.len() + 2)
            .sum();
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.len()).sum::<usize>() + extra);

        let mut cursor = 0;
        for edit in edits {
            if edit.range.start < cursor {
                log::warn!(line = edit.range.start; "Skipping overlapping edit");
                continue;
            }
            for line in &self.lines[cursor..edit.range.start] {
                out.push_str(line);
            }
            if !edit.lines.is_empty() && !out.is_empty() && !out.ends_with('\n') {
                out.push_str(self.newline);
            }
            let unterminated_tail = edit.range.end == self.lines.len()
                && edit.range.end > edit.range.start
                && !self.lines[edit.range.end - 1].ends_with('\n');
            let count = edit.lines.len();
            for (idx, line) in edit.lines.iter().enumerate() {
                out.push_str(line);
                if !(unterminated_tail && idx + 1 == count) {
                    out.push_str(self.newline);
                }
            }
            cursor = edit.range.end;
        }
        for line in &self.lines[cursor.min(self.lines.len())..] {
            out.push_str(line);
        }
        out
    }
}

pub(crate) fn indent_of(content: &str) -> usize {
    content.len() - content.trim_start_matches(' ').len()
}

/// Blank lines and comment-only lines carry no structure.
pub(crate) fn is_trivia(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed == "---" || trimmed == "..."
}

fn is_list_marker(trimmed: &str) -> bool {
    trimmed == "-" || trimmed.starts_with("- ")
}

/// A `key: value` line. `key_col` is the byte column of the key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KeyLine {
    pub key: String,
    pub key_col: usize,
    /// Raw value with the trailing comment removed.
    pub value: String,
    /// Trailing comment, including its leading whitespace.
    pub comment: String,
}

pub(crate) fn parse_key_line(content: &str, key_col: usize) -> Option<KeyLine> {
    let text = content.get(key_col..)?;
    let caps = KEY_LINE.captures(text)?;
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let (value, comment) = split_comment(rest);
    // `key: # note` has no value, only a comment
    let (value, comment) = if value.starts_with('#') {
        ("", rest)
    } else {
        (value, comment)
    };
    Some(KeyLine {
        key: caps[1].to_string(),
        key_col,
        value: value.to_string(),
        comment: comment.to_string(),
    })
}

/// One field of a list item, spanning `line..end`.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub line: usize,
    pub end: usize,
    pub key_line: KeyLine,
}

/// The elements of an array field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ListForm {
    /// `key: [a, b]`, raw elements.
    Inline(Vec<String>),
    /// `key:` followed by `- a` lines: `(line, raw element, comment)`.
    Block(Vec<(usize, String, String)>),
}

impl Field {
    pub fn key(&self) -> &str {
        &self.key_line.key
    }

    /// The scalar value with quotes removed.
    pub fn scalar(&self) -> String {
        unquote(&self.key_line.value)
    }

    pub fn list(&self, lines: &Lines<'_>) -> Option<ListForm> {
        let value = self.key_line.value.trim();
        if value.starts_with('[') && value.ends_with(']') {
            let inner = &value[1..value.len() - 1];
            return Some(ListForm::Inline(
                split_flow_elements(inner)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ));
        }
        if !value.is_empty() {
            return None;
        }
        let elements: Vec<(usize, String, String)> = (self.line + 1..self.end)
            .filter_map(|idx| {
                let content = lines.content(idx);
                let trimmed = content.trim_start();
                if !is_list_marker(trimmed) {
                    return None;
                }
                let (raw, comment) = split_comment(trimmed[1..].trim_start());
                Some((idx, raw.to_string(), comment.to_string()))
            })
            .collect();
        Some(ListForm::Block(elements))
    }
}

/// A block list item, spanning `start..end` (trailing trivia excluded).
#[derive(Debug, Clone)]
pub(crate) struct Item {
    pub start: usize,
    pub end: usize,
    pub indent: usize,
    pub field_indent: usize,
    pub fields: Vec<Field>,
}

impl Item {
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key() == key)
    }

    pub fn ref_value(&self) -> Option<String> {
        self.field("ref").map(Field::scalar)
    }
}

/// A top-level key and, when its value is a block list, the list items.
#[derive(Debug, Clone)]
pub(crate) struct Section {
    pub line: usize,
    /// One past the last non-trivia line of the section.
    pub end: usize,
    pub key_line: KeyLine,
    pub items: Vec<Item>,
}

impl Section {
    pub fn key(&self) -> &str {
        &self.key_line.key
    }

    pub fn item(&self, r#ref: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.ref_value().as_deref() == Some(r#ref))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Outline {
    pub sections: Vec<Section>,
}

impl Outline {
    pub fn parse(lines: &Lines<'_>) -> Self {
        let starts: Vec<(usize, KeyLine)> = (0..lines.len())
            .filter_map(|idx| {
                let content = lines.content(idx);
                if is_trivia(content) || indent_of(content) != 0 || content.starts_with('-') {
                    return None;
                }
                parse_key_line(content, 0).map(|kl| (idx, kl))
            })
            .collect();

        let mut sections = Vec::with_capacity(starts.len());
        for (pos, (line, key_line)) in starts.iter().enumerate() {
            let limit = starts
                .get(pos + 1)
                .map_or(lines.len(), |(next, _)| *next);
            let end = last_content_line(lines, *line, limit);
            let items = parse_items(lines, line + 1, end);
            sections.push(Section {
                line: *line,
                end,
                key_line: key_line.clone(),
                items,
            });
        }
        Self { sections }
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key() == key)
    }

    /// The item with `ref` in section `collection`.
    pub fn item(&self, collection: &str, r#ref: &str) -> Option<&Item> {
        self.section(collection)?.item(r#ref)
    }

    /// Fields named in `keys`, across every item of every section.
    pub fn item_fields<'s>(&'s self, keys: &'s [&str]) -> impl Iterator<Item = (&'s Section, &'s Field)> + 's {
        self.sections.iter().flat_map(move |section| {
            section.items.iter().flat_map(move |item| {
                item.fields
                    .iter()
                    .filter(move |f| keys.contains(&f.key()))
                    .map(move |f| (section, f))
            })
        })
    }
}

/// One past the last non-trivia line in `from..limit` (at least `from + 1`).
fn last_content_line(lines: &Lines<'_>, from: usize, limit: usize) -> usize {
    (from..limit)
        .rev()
        .find(|idx| !is_trivia(lines.content(*idx)))
        .map_or(from + 1, |idx| idx + 1)
}

fn parse_items(lines: &Lines<'_>, from: usize, end: usize) -> Vec<Item> {
    let Some(first) = (from..end).find(|idx| !is_trivia(lines.content(*idx))) else {
        return Vec::new();
    };
    let first_content = lines.content(first);
    if !is_list_marker(first_content.trim_start()) {
        return Vec::new();
    }
    let indent = indent_of(first_content);

    let starts: Vec<usize> = (first..end)
        .filter(|idx| {
            let content = lines.content(*idx);
            !is_trivia(content)
                && indent_of(content) == indent
                && is_list_marker(content.trim_start())
        })
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(pos, start)| {
            let limit = starts.get(pos + 1).copied().unwrap_or(end);
            let item_end = last_content_line(lines, *start, limit);
            parse_item(lines, *start, item_end, indent)
        })
        .collect()
}

fn parse_item(lines: &Lines<'_>, start: usize, end: usize, indent: usize) -> Item {
    let dash_line = lines.content(start);
    let after_dash = &dash_line[indent + 1..];
    let inline_key = !after_dash.trim().is_empty();
    let field_indent = if inline_key {
        indent + 1 + indent_of(after_dash)
    } else {
        (start + 1..end)
            .map(|idx| lines.content(idx))
            .find(|c| !is_trivia(c))
            .map_or(indent + 2, indent_of)
    };

    let mut field_starts: Vec<(usize, KeyLine)> = Vec::new();
    for idx in start..end {
        let content = lines.content(idx);
        if is_trivia(content) {
            continue;
        }
        let on_dash_line = idx == start && inline_key;
        if !on_dash_line && (idx == start || indent_of(content) != field_indent) {
            continue;
        }
        if let Some(kl) = parse_key_line(content, field_indent) {
            field_starts.push((idx, kl));
        }
    }

    let fields = field_starts
        .iter()
        .enumerate()
        .map(|(pos, (line, key_line))| {
            let limit = field_starts.get(pos + 1).map_or(end, |(next, _)| *next);
            Field {
                line: *line,
                end: last_content_line(lines, *line, limit),
                key_line: key_line.clone(),
            }
        })
        .collect();

    Item {
        start,
        end,
        indent,
        field_indent,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
schema_version: '1.0'
name: Demo # title
components:
  - ref: api   # entry point
    name: API
    assets: [A01, \"A02\"]

  - ref: db
    name: DB
    x: 10
# shared
boundaries:
- ref: b1
  name: Edge
  components:
    - api
    - db  # store
";

    #[test]
    fn test_sections() {
        let lines = Lines::new(DOC);
        let outline = Outline::parse(&lines);
        let keys: Vec<&str> = outline.sections.iter().map(Section::key).collect();
        assert_eq!(keys, vec!["schema_version", "name", "components", "boundaries"]);

        let name = outline.section("name").unwrap();
        assert_eq!(name.key_line.value, "Demo");
        assert_eq!(name.key_line.comment, " # title");

        let components = outline.section("components").unwrap();
        assert_eq!(components.items.len(), 2);
        assert_eq!(components.end, 10);
    }

    #[test]
    fn test_items_and_fields() {
        let lines = Lines::new(DOC);
        let outline = Outline::parse(&lines);

        let api = outline.item("components", "api").unwrap();
        assert_eq!(api.start, 3);
        assert_eq!(api.end, 6);
        assert_eq!(api.field_indent, 4);
        assert_eq!(api.field("ref").unwrap().key_line.comment, "   # entry point");
        assert_eq!(
            api.field("assets").unwrap().list(&lines),
            Some(ListForm::Inline(vec!["A01".to_string(), "\"A02\"".to_string()]))
        );

        let db = outline.item("components", "db").unwrap();
        assert_eq!(db.field("x").unwrap().scalar(), "10");
    }

    #[test]
    fn test_zero_indented_block_list() {
        let lines = Lines::new(DOC);
        let outline = Outline::parse(&lines);

        let boundary = outline.item("boundaries", "b1").unwrap();
        assert_eq!(boundary.field_indent, 2);
        let Some(ListForm::Block(elements)) = boundary.field("components").unwrap().list(&lines)
        else {
            panic!("expected block list");
        };
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].1, "db");
        assert_eq!(elements[1].2, "  # store");
    }

    #[test]
    fn test_splice_preserves_untouched_bytes() {
        let src = "a: 1\r\nb: 2\r\nc: 3";
        let lines = Lines::new(src);
        let out = lines.splice(vec![Edit::replace(1, "b: 20".to_string())]);
        assert_eq!(out, "a: 1\r\nb: 20\r\nc: 3");

        let out = lines.splice(vec![Edit::insert(3, vec!["d: 4".to_string()])]);
        assert_eq!(out, "a: 1\r\nb: 2\r\nc: 3\r\nd: 4\r\n");

        let out = lines.splice(vec![Edit::replace(2, "c: 30".to_string())]);
        assert_eq!(out, "a: 1\r\nb: 2\r\nc: 30");
    }
}
