//! Ref generation, slugs and placeholder names.
//!
//! Refs are the human-readable identifiers that tie the document together.
//! New entities get a fresh ref from one of the `next_*_ref` helpers; the
//! regeneration pass derives refs from names with [`slugify`].
//!
//! # Examples
//!
//! ```
//! use threatmap_core::identifier::{next_component_ref, next_threat_ref, slugify};
//!
//! assert_eq!(next_component_ref(["component-1"]), "component-2");
//! assert_eq!(next_threat_ref(Vec::<String>::new()), "T01");
//! assert_eq!(slugify("Web  Server (v2)"), "web-server-v2");
//! ```

use std::{collections::HashSet, fmt::Display, sync::LazyLock};

use regex::Regex;

use crate::model::Direction;

static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("valid regex"));
static SLUG_COLLAPSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));

static PLACEHOLDER_COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Component \d+$").expect("valid regex"));
static PLACEHOLDER_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Boundary \d+$").expect("valid regex"));
static PLACEHOLDER_ASSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Asset A\d{2,}$").expect("valid regex"));
static PLACEHOLDER_THREAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Threat T\d{2,}$").expect("valid regex"));
static PLACEHOLDER_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Control C\d{2,}$").expect("valid regex"));
static PLACEHOLDER_DATA_FLOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DF\d+$").expect("valid regex"));

/// Generates the first ref of the form `prefix-N` (or `PREFIXNN` when
/// `zero_pad` is set) that is not in `existing`.
///
/// Numbering starts at 1. `uppercase` upper-cases the prefix.
///
/// ```
/// # use threatmap_core::identifier::generate_unique_ref;
/// assert_eq!(generate_unique_ref("boundary", ["boundary-1"], false, false), "boundary-2");
/// assert_eq!(generate_unique_ref("a", ["A01", "A02"], true, true), "A03");
/// ```
pub fn generate_unique_ref<I, S>(prefix: &str, existing: I, uppercase: bool, zero_pad: bool) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<String> = existing.into_iter().map(|s| s.as_ref().to_string()).collect();
    let prefix = if uppercase {
        prefix.to_uppercase()
    } else {
        prefix.to_string()
    };

    (1usize..)
        .map(|n| {
            if zero_pad {
                format!("{prefix}{n:02}")
            } else {
                format!("{prefix}-{n}")
            }
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_default()
}

pub fn next_component_ref<I: IntoIterator<Item = S>, S: AsRef<str>>(existing: I) -> String {
    generate_unique_ref("component", existing, false, false)
}

pub fn next_boundary_ref<I: IntoIterator<Item = S>, S: AsRef<str>>(existing: I) -> String {
    generate_unique_ref("boundary", existing, false, false)
}

pub fn next_asset_ref<I: IntoIterator<Item = S>, S: AsRef<str>>(existing: I) -> String {
    generate_unique_ref("A", existing, true, true)
}

pub fn next_threat_ref<I: IntoIterator<Item = S>, S: AsRef<str>>(existing: I) -> String {
    generate_unique_ref("T", existing, true, true)
}

pub fn next_control_ref<I: IntoIterator<Item = S>, S: AsRef<str>>(existing: I) -> String {
    generate_unique_ref("C", existing, true, true)
}

/// Turns a name (or a number) into a ref-safe slug.
///
/// The value is lower-cased, characters other than ASCII word characters,
/// whitespace and hyphens are dropped, runs of whitespace, underscores and
/// hyphens collapse to one hyphen, and leading or trailing hyphens are
/// trimmed. The result may be empty.
pub fn slugify(value: impl Display) -> String {
    let lowered = value.to_string().to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lowered, "");
    let collapsed = SLUG_COLLAPSE.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

/// Returns `base` if free, otherwise `base{sep}2`, `base{sep}3`, ...
pub fn disambiguate(base: &str, taken: &HashSet<String>, separator: char) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2usize..)
        .map(|n| format!("{base}{separator}{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_default()
}

/// Builds `source->destination` (or `<->` for bidirectional flows), suffixed
/// with `_2`, `_3`, ... on collision.
pub fn generate_data_flow_ref<I, S>(
    source: &str,
    destination: &str,
    direction: Direction,
    existing: I,
) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<String> = existing.into_iter().map(|s| s.as_ref().to_string()).collect();
    let base = format!("{source}{}{destination}", direction.arrow());
    disambiguate(&base, &taken, '_')
}

pub fn default_component_name(count: usize) -> String {
    format!("Component {}", count + 1)
}

pub fn default_boundary_name(count: usize) -> String {
    format!("Boundary {}", count + 1)
}

/// Placeholder name for a fresh asset, derived from its ref (`A03` gives
/// `Asset A03`).
pub fn default_asset_name(entity_ref: &str) -> String {
    format!("Asset {entity_ref}")
}

pub fn default_threat_name(entity_ref: &str) -> String {
    format!("Threat {entity_ref}")
}

pub fn default_control_name(entity_ref: &str) -> String {
    format!("Control {entity_ref}")
}

/// Label for the `count + 1`-th data flow.
pub fn default_data_flow_label(count: usize) -> String {
    format!("DF{}", count + 1)
}

pub fn is_placeholder_component_name(name: &str) -> bool {
    PLACEHOLDER_COMPONENT.is_match(name)
}

pub fn is_placeholder_boundary_name(name: &str) -> bool {
    PLACEHOLDER_BOUNDARY.is_match(name)
}

pub fn is_placeholder_asset_name(name: &str) -> bool {
    PLACEHOLDER_ASSET.is_match(name)
}

pub fn is_placeholder_threat_name(name: &str) -> bool {
    PLACEHOLDER_THREAT.is_match(name)
}

pub fn is_placeholder_control_name(name: &str) -> bool {
    PLACEHOLDER_CONTROL.is_match(name)
}

pub fn is_placeholder_data_flow_label(label: &str) -> bool {
    PLACEHOLDER_DATA_FLOW.is_match(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ref_skips_taken() {
        let existing = ["component-1", "component-2", "component-4"];
        assert_eq!(next_component_ref(existing), "component-3");
        assert_eq!(next_boundary_ref(Vec::<&str>::new()), "boundary-1");
    }

    #[test]
    fn test_zero_padded_refs() {
        assert_eq!(next_asset_ref(Vec::<&str>::new()), "A01");
        assert_eq!(next_threat_ref(["T01", "T02"]), "T03");
        assert_eq!(next_control_ref(["C02"]), "C01");

        let many: Vec<String> = (1..=99).map(|n| format!("T{n:02}")).collect();
        assert_eq!(next_threat_ref(&many), "T100");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("API Gateway"), "api-gateway");
        assert_eq!(slugify("  --User_DB--  "), "user-db");
        assert_eq!(slugify("Auth (OAuth2.0)"), "auth-oauth20");
        assert_eq!(slugify(2024), "2024");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_generate_data_flow_ref() {
        assert_eq!(
            generate_data_flow_ref("api", "db", Direction::Unidirectional, Vec::<&str>::new()),
            "api->db"
        );
        assert_eq!(
            generate_data_flow_ref("api", "db", Direction::Bidirectional, ["api<->db"]),
            "api<->db_2"
        );
        assert_eq!(
            generate_data_flow_ref("api", "db", Direction::Unidirectional, ["api->db", "api->db_2"]),
            "api->db_3"
        );
    }

    #[test]
    fn test_disambiguate() {
        let taken: HashSet<String> = ["web".to_string(), "web-2".to_string()].into();
        assert_eq!(disambiguate("web", &taken, '-'), "web-3");
        assert_eq!(disambiguate("db", &taken, '-'), "db");
    }

    #[test]
    fn test_default_names_are_placeholders() {
        assert!(is_placeholder_component_name(&default_component_name(0)));
        assert!(is_placeholder_boundary_name(&default_boundary_name(4)));
        assert!(is_placeholder_asset_name(&default_asset_name("A07")));
        assert!(is_placeholder_threat_name(&default_threat_name("T12")));
        assert!(is_placeholder_control_name(&default_control_name("C01")));
        assert_eq!(default_data_flow_label(2), "DF3");
        assert!(is_placeholder_data_flow_label(&default_data_flow_label(2)));

        assert!(!is_placeholder_component_name("Component Registry"));
        assert!(!is_placeholder_asset_name("Asset A1"));
        assert!(!is_placeholder_data_flow_label("DF"));
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        // =====================================================================
        // Strategies
        // =====================================================================

        fn name_strategy() -> impl Strategy<Value = String> {
            "[ -~]{0,40}"
        }

        fn existing_refs_strategy() -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec((1usize..30).prop_map(|n| format!("component-{n}")), 0..20)
        }

        // =====================================================================
        // Property Test Functions
        // =====================================================================

        fn check_slug_shape(name: &str) -> Result<(), TestCaseError> {
            let slug = slugify(name);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(
                slug.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            );
            prop_assert_eq!(slugify(&slug), slug.clone());
            Ok(())
        }

        fn check_unique_ref_is_fresh(existing: &[String]) -> Result<(), TestCaseError> {
            let generated = next_component_ref(existing);
            prop_assert!(!existing.contains(&generated));
            prop_assert!(generated.starts_with("component-"));
            Ok(())
        }

        // =====================================================================
        // Proptest Wrappers
        // =====================================================================

        proptest! {
            #[test]
            fn slug_shape(name in name_strategy()) {
                check_slug_shape(&name)?;
            }

            #[test]
            fn unique_ref_is_fresh(existing in existing_refs_strategy()) {
                check_unique_ref_is_fresh(&existing)?;
            }
        }
    }
}
