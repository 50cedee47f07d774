//! The structured threat-model document.
//!
//! [`ThreatModel`] is the aggregate root. It owns six flat collections of
//! entities, and every relationship between entities is a plain `ref` string
//! rather than a pointer. Referential integrity is maintained procedurally by
//! [`ThreatModel::strip_reference`] and [`ThreatModel::rename_reference`].
//!
//! Optional fields are `Option`s so that an absent field stays absent through
//! every round trip; an empty list (`Some(vec![])`) and a missing list (`None`)
//! are different documents.

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The six entity collections of a threat model.
///
/// Variants are declared in the order used by ref regeneration: all named
/// entities first, data flows last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Component,
    Boundary,
    Asset,
    Threat,
    Control,
    DataFlow,
}

impl EntityKind {
    /// All kinds, in regeneration order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Component,
        EntityKind::Boundary,
        EntityKind::Asset,
        EntityKind::Threat,
        EntityKind::Control,
        EntityKind::DataFlow,
    ];

    /// The top-level document key holding this collection.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Component => "components",
            Self::Boundary => "boundaries",
            Self::Asset => "assets",
            Self::Threat => "threats",
            Self::Control => "controls",
            Self::DataFlow => "data_flows",
        }
    }

    /// Array fields (on any entity) whose elements are refs of this kind.
    pub fn referencing_array_fields(self) -> Vec<&'static str> {
        RELATIONSHIPS
            .iter()
            .filter(|rel| rel.target == self && rel.many)
            .map(|rel| rel.field)
            .collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Component => "component",
            Self::Boundary => "boundary",
            Self::Asset => "asset",
            Self::Threat => "threat",
            Self::Control => "control",
            Self::DataFlow => "data_flow",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an unknown [`EntityKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity kind `{0}`")]
pub struct UnknownEntityKind(String);

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    /// Accepts both the singular name and the collection key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s || kind.collection() == s)
            .ok_or_else(|| UnknownEntityKind(s.to_string()))
    }
}

/// A relationship field: `owner.field` holds refs of kind `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub owner: EntityKind,
    pub field: &'static str,
    pub target: EntityKind,
    /// `true` for ref lists, `false` for single-ref fields.
    pub many: bool,
}

/// Every relationship field of the document schema.
pub const RELATIONSHIPS: &[Relationship] = &[
    Relationship {
        owner: EntityKind::Component,
        field: "assets",
        target: EntityKind::Asset,
        many: true,
    },
    Relationship {
        owner: EntityKind::DataFlow,
        field: "source",
        target: EntityKind::Component,
        many: false,
    },
    Relationship {
        owner: EntityKind::DataFlow,
        field: "destination",
        target: EntityKind::Component,
        many: false,
    },
    Relationship {
        owner: EntityKind::Boundary,
        field: "components",
        target: EntityKind::Component,
        many: true,
    },
    Relationship {
        owner: EntityKind::Threat,
        field: "affected_components",
        target: EntityKind::Component,
        many: true,
    },
    Relationship {
        owner: EntityKind::Threat,
        field: "affected_data_flows",
        target: EntityKind::DataFlow,
        many: true,
    },
    Relationship {
        owner: EntityKind::Threat,
        field: "affected_assets",
        target: EntityKind::Asset,
        many: true,
    },
    Relationship {
        owner: EntityKind::Control,
        field: "mitigates",
        target: EntityKind::Threat,
        many: true,
    },
    Relationship {
        owner: EntityKind::Control,
        field: "implemented_in",
        target: EntityKind::Component,
        many: true,
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    #[default]
    Internal,
    #[serde(alias = "external_dependency")]
    External,
    DataStore,
}

impl ComponentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::DataStore => "data_store",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Unidirectional,
    Bidirectional,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unidirectional => "unidirectional",
            Self::Bidirectional => "bidirectional",
        }
    }

    /// The arrow used when deriving a data flow ref from its endpoints.
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Unidirectional => "->",
            Self::Bidirectional => "<->",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "ref", deserialize_with = "text::required")]
    pub r#ref: String,
    #[serde(deserialize_with = "text::required")]
    pub name: String,
    #[serde(default)]
    pub component_type: ComponentType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub assets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl Component {
    pub fn new(r#ref: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            r#ref: r#ref.into(),
            name: name.into(),
            component_type: ComponentType::default(),
            description: None,
            assets: None,
            x: None,
            y: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "ref", deserialize_with = "text::required")]
    pub r#ref: String,
    #[serde(deserialize_with = "text::required")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlow {
    #[serde(rename = "ref", deserialize_with = "text::required")]
    pub r#ref: String,
    #[serde(deserialize_with = "text::required")]
    pub source: String,
    #[serde(deserialize_with = "text::required")]
    pub destination: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub source_point: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub destination_point: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    #[serde(rename = "ref", deserialize_with = "text::required")]
    pub r#ref: String,
    #[serde(deserialize_with = "text::required")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl Boundary {
    /// Returns `(x, y, width, height)` when all four are set.
    pub fn explicit_geometry(&self) -> Option<(f64, f64, f64, f64)> {
        Some((self.x?, self.y?, self.width?, self.height?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    #[serde(rename = "ref", deserialize_with = "text::required")]
    pub r#ref: String,
    #[serde(deserialize_with = "text::required")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub affected_components: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub affected_data_flows: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub affected_assets: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub status_link: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub status_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    #[serde(rename = "ref", deserialize_with = "text::required")]
    pub r#ref: String,
    #[serde(deserialize_with = "text::required")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub mitigates: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub implemented_in: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub status_link: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub status_note: Option<String>,
}

/// The aggregate root of a threat-model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatModel {
    #[serde(deserialize_with = "text::required")]
    pub schema_version: String,
    #[serde(deserialize_with = "text::required")]
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text::optional_list"
    )]
    pub participants: Option<Vec<String>>,
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<Asset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_flows: Option<Vec<DataFlow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundaries: Option<Vec<Boundary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threats: Option<Vec<Threat>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<Vec<Control>>,
}

/// A relationship field whose ref does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub owner: EntityKind,
    pub owner_ref: String,
    pub field: &'static str,
    pub target: String,
}

impl ThreatModel {
    /// Creates an empty model with only the mandatory fields set.
    pub fn new(schema_version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            name: name.into(),
            description: None,
            participants: None,
            components: Vec::new(),
            assets: None,
            data_flows: None,
            boundaries: None,
            threats: None,
            controls: None,
        }
    }

    pub fn assets(&self) -> &[Asset] {
        self.assets.as_deref().unwrap_or_default()
    }

    pub fn data_flows(&self) -> &[DataFlow] {
        self.data_flows.as_deref().unwrap_or_default()
    }

    pub fn boundaries(&self) -> &[Boundary] {
        self.boundaries.as_deref().unwrap_or_default()
    }

    pub fn threats(&self) -> &[Threat] {
        self.threats.as_deref().unwrap_or_default()
    }

    pub fn controls(&self) -> &[Control] {
        self.controls.as_deref().unwrap_or_default()
    }

    pub fn component(&self, r#ref: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.r#ref == r#ref)
    }

    pub fn component_mut(&mut self, r#ref: &str) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.r#ref == r#ref)
    }

    pub fn boundary(&self, r#ref: &str) -> Option<&Boundary> {
        self.boundaries().iter().find(|b| b.r#ref == r#ref)
    }

    pub fn boundary_mut(&mut self, r#ref: &str) -> Option<&mut Boundary> {
        self.boundaries
            .as_mut()?
            .iter_mut()
            .find(|b| b.r#ref == r#ref)
    }

    pub fn data_flow(&self, r#ref: &str) -> Option<&DataFlow> {
        self.data_flows().iter().find(|f| f.r#ref == r#ref)
    }

    pub fn data_flow_mut(&mut self, r#ref: &str) -> Option<&mut DataFlow> {
        self.data_flows
            .as_mut()?
            .iter_mut()
            .find(|f| f.r#ref == r#ref)
    }

    pub fn asset_mut(&mut self, r#ref: &str) -> Option<&mut Asset> {
        self.assets.as_mut()?.iter_mut().find(|a| a.r#ref == r#ref)
    }

    pub fn threat_mut(&mut self, r#ref: &str) -> Option<&mut Threat> {
        self.threats.as_mut()?.iter_mut().find(|t| t.r#ref == r#ref)
    }

    pub fn control_mut(&mut self, r#ref: &str) -> Option<&mut Control> {
        self.controls.as_mut()?.iter_mut().find(|c| c.r#ref == r#ref)
    }

    /// Refs of one collection, in document order.
    pub fn refs(&self, kind: EntityKind) -> Vec<&str> {
        match kind {
            EntityKind::Component => self.components.iter().map(|e| e.r#ref.as_str()).collect(),
            EntityKind::Boundary => self.boundaries().iter().map(|e| e.r#ref.as_str()).collect(),
            EntityKind::Asset => self.assets().iter().map(|e| e.r#ref.as_str()).collect(),
            EntityKind::Threat => self.threats().iter().map(|e| e.r#ref.as_str()).collect(),
            EntityKind::Control => self.controls().iter().map(|e| e.r#ref.as_str()).collect(),
            EntityKind::DataFlow => self.data_flows().iter().map(|e| e.r#ref.as_str()).collect(),
        }
    }

    /// Display names of one collection paired with their refs.
    ///
    /// Data flows have no name; their label is returned instead.
    pub fn names(&self, kind: EntityKind) -> Vec<(&str, Option<&str>)> {
        match kind {
            EntityKind::Component => self
                .components
                .iter()
                .map(|e| (e.r#ref.as_str(), Some(e.name.as_str())))
                .collect(),
            EntityKind::Boundary => self
                .boundaries()
                .iter()
                .map(|e| (e.r#ref.as_str(), Some(e.name.as_str())))
                .collect(),
            EntityKind::Asset => self
                .assets()
                .iter()
                .map(|e| (e.r#ref.as_str(), Some(e.name.as_str())))
                .collect(),
            EntityKind::Threat => self
                .threats()
                .iter()
                .map(|e| (e.r#ref.as_str(), Some(e.name.as_str())))
                .collect(),
            EntityKind::Control => self
                .controls()
                .iter()
                .map(|e| (e.r#ref.as_str(), Some(e.name.as_str())))
                .collect(),
            EntityKind::DataFlow => self
                .data_flows()
                .iter()
                .map(|e| (e.r#ref.as_str(), e.label.as_deref()))
                .collect(),
        }
    }

    pub fn contains(&self, kind: EntityKind, r#ref: &str) -> bool {
        self.refs(kind).contains(&r#ref)
    }

    /// Every ref of every collection.
    pub fn all_refs(&self) -> HashSet<String> {
        EntityKind::ALL
            .iter()
            .flat_map(|kind| self.refs(*kind))
            .map(str::to_string)
            .collect()
    }

    /// Refs of the data flows that start or end at `component_ref`.
    pub fn flows_touching(&self, component_ref: &str) -> Vec<String> {
        self.data_flows()
            .iter()
            .filter(|f| f.source == component_ref || f.destination == component_ref)
            .map(|f| f.r#ref.clone())
            .collect()
    }

    /// The boundary whose `components` list holds `component_ref`, if any.
    pub fn boundary_of(&self, component_ref: &str) -> Option<&Boundary> {
        self.boundaries().iter().find(|b| {
            b.components
                .as_deref()
                .is_some_and(|refs| refs.iter().any(|r| r == component_ref))
        })
    }

    /// Removes the entity itself, leaving references to it untouched.
    ///
    /// Returns `false` when no entity with that ref exists.
    pub fn remove_entity(&mut self, kind: EntityKind, r#ref: &str) -> bool {
        fn retain<T>(items: Option<&mut Vec<T>>, keep: impl Fn(&T) -> bool) -> bool {
            let Some(items) = items else {
                return false;
            };
            let before = items.len();
            items.retain(keep);
            before != items.len()
        }

        match kind {
            EntityKind::Component => retain(Some(&mut self.components), |e| e.r#ref != r#ref),
            EntityKind::Boundary => retain(self.boundaries.as_mut(), |e| e.r#ref != r#ref),
            EntityKind::Asset => retain(self.assets.as_mut(), |e| e.r#ref != r#ref),
            EntityKind::Threat => retain(self.threats.as_mut(), |e| e.r#ref != r#ref),
            EntityKind::Control => retain(self.controls.as_mut(), |e| e.r#ref != r#ref),
            EntityKind::DataFlow => retain(self.data_flows.as_mut(), |e| e.r#ref != r#ref),
        }
    }

    /// Changes the ref of the entity itself. Returns `false` if not found.
    pub fn set_entity_ref(&mut self, kind: EntityKind, old: &str, new: &str) -> bool {
        let slot = match kind {
            EntityKind::Component => self.component_mut(old).map(|e| &mut e.r#ref),
            EntityKind::Boundary => self.boundary_mut(old).map(|e| &mut e.r#ref),
            EntityKind::Asset => self.asset_mut(old).map(|e| &mut e.r#ref),
            EntityKind::Threat => self.threat_mut(old).map(|e| &mut e.r#ref),
            EntityKind::Control => self.control_mut(old).map(|e| &mut e.r#ref),
            EntityKind::DataFlow => self.data_flow_mut(old).map(|e| &mut e.r#ref),
        };
        match slot {
            Some(slot) => {
                *slot = new.to_string();
                true
            }
            None => false,
        }
    }

    /// Removes `r#ref` from every ref list that targets `kind`.
    ///
    /// Returns the number of list elements removed.
    pub fn strip_reference(&mut self, kind: EntityKind, r#ref: &str) -> usize {
        let mut removed = 0;
        self.for_each_ref_list_mut(kind, |list| {
            let before = list.len();
            list.retain(|r| r != r#ref);
            removed += before - list.len();
        });
        removed
    }

    /// Rewrites `old` to `new` in every relationship field targeting `kind`,
    /// including data flow endpoints when `kind` is a component.
    pub fn rename_reference(&mut self, kind: EntityKind, old: &str, new: &str) {
        self.for_each_ref_list_mut(kind, |list| {
            for r in list.iter_mut().filter(|r| r.as_str() == old) {
                *r = new.to_string();
            }
        });

        if kind == EntityKind::Component {
            for flow in self.data_flows.iter_mut().flatten() {
                if flow.source == old {
                    flow.source = new.to_string();
                }
                if flow.destination == old {
                    flow.destination = new.to_string();
                }
            }
        }
    }

    /// Lists every relationship ref that does not resolve to an entity of
    /// the expected kind.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let known: Vec<(EntityKind, HashSet<&str>)> = EntityKind::ALL
            .iter()
            .map(|kind| (*kind, self.refs(*kind).into_iter().collect()))
            .collect();
        let resolves = |kind: EntityKind, r: &str| {
            known
                .iter()
                .any(|(k, refs)| *k == kind && refs.contains(r))
        };

        let mut dangling = Vec::new();
        let mut check = |owner: EntityKind, owner_ref: &str, rel: &Relationship, refs: &[String]| {
            for r in refs.iter().filter(|r| !resolves(rel.target, r)) {
                dangling.push(DanglingReference {
                    owner,
                    owner_ref: owner_ref.to_string(),
                    field: rel.field,
                    target: r.clone(),
                });
            }
        };

        for rel in RELATIONSHIPS {
            match (rel.owner, rel.field) {
                (EntityKind::Component, _) => {
                    for c in &self.components {
                        check(rel.owner, &c.r#ref, rel, c.assets.as_deref().unwrap_or_default());
                    }
                }
                (EntityKind::DataFlow, "source") => {
                    for f in self.data_flows() {
                        check(rel.owner, &f.r#ref, rel, std::slice::from_ref(&f.source));
                    }
                }
                (EntityKind::DataFlow, _) => {
                    for f in self.data_flows() {
                        check(rel.owner, &f.r#ref, rel, std::slice::from_ref(&f.destination));
                    }
                }
                (EntityKind::Boundary, _) => {
                    for b in self.boundaries() {
                        check(rel.owner, &b.r#ref, rel, b.components.as_deref().unwrap_or_default());
                    }
                }
                (EntityKind::Threat, field) => {
                    for t in self.threats() {
                        let refs = match field {
                            "affected_components" => &t.affected_components,
                            "affected_data_flows" => &t.affected_data_flows,
                            _ => &t.affected_assets,
                        };
                        check(rel.owner, &t.r#ref, rel, refs.as_deref().unwrap_or_default());
                    }
                }
                (EntityKind::Control, field) => {
                    for c in self.controls() {
                        let refs = match field {
                            "mitigates" => &c.mitigates,
                            _ => &c.implemented_in,
                        };
                        check(rel.owner, &c.r#ref, rel, refs.as_deref().unwrap_or_default());
                    }
                }
                (EntityKind::Asset, _) => {}
            }
        }
        dangling
    }

    fn for_each_ref_list_mut(&mut self, target: EntityKind, mut f: impl FnMut(&mut Vec<String>)) {
        match target {
            EntityKind::Component => {
                for b in self.boundaries.iter_mut().flatten() {
                    b.components.iter_mut().for_each(&mut f);
                }
                for t in self.threats.iter_mut().flatten() {
                    t.affected_components.iter_mut().for_each(&mut f);
                }
                for c in self.controls.iter_mut().flatten() {
                    c.implemented_in.iter_mut().for_each(&mut f);
                }
            }
            EntityKind::Asset => {
                for c in &mut self.components {
                    c.assets.iter_mut().for_each(&mut f);
                }
                for t in self.threats.iter_mut().flatten() {
                    t.affected_assets.iter_mut().for_each(&mut f);
                }
            }
            EntityKind::DataFlow => {
                for t in self.threats.iter_mut().flatten() {
                    t.affected_data_flows.iter_mut().for_each(&mut f);
                }
            }
            EntityKind::Threat => {
                for c in self.controls.iter_mut().flatten() {
                    c.mitigates.iter_mut().for_each(&mut f);
                }
            }
            EntityKind::Boundary | EntityKind::Control => {}
        }
    }
}

/// Lenient text deserializers.
///
/// YAML authors write `name: 2024` or `ref: 7` without quotes; these
/// helpers accept numbers and booleans wherever the model expects text and
/// coerce them to their decimal string.
mod text {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    impl From<Text> for String {
        fn from(text: Text) -> Self {
            match text {
                Text::Str(s) => s,
                Text::Int(i) => i.to_string(),
                Text::Float(f) => format!("{f:?}"),
                Text::Bool(b) => b.to_string(),
            }
        }
    }

    pub(super) fn required<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Text::deserialize(d).map(String::from)
    }

    pub(super) fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Option::<Text>::deserialize(d).map(|text| text.map(String::from))
    }

    pub(super) fn optional_list<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Vec<String>>, D::Error> {
        Option::<Vec<Text>>::deserialize(d)
            .map(|items| items.map(|items| items.into_iter().map(String::from).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ThreatModel {
        let mut model = ThreatModel::new("1.0", "Sample");
        model.components = vec![
            Component::new("api", "API"),
            Component::new("db", "Database"),
        ];
        model.components[0].assets = Some(vec!["A01".to_string()]);
        model.assets = Some(vec![Asset {
            r#ref: "A01".to_string(),
            name: "Credentials".to_string(),
            description: None,
        }]);
        model.data_flows = Some(vec![DataFlow {
            r#ref: "api->db".to_string(),
            source: "api".to_string(),
            destination: "db".to_string(),
            source_point: None,
            destination_point: None,
            direction: Direction::Unidirectional,
            label: Some("DF1".to_string()),
        }]);
        model.boundaries = Some(vec![Boundary {
            r#ref: "boundary-1".to_string(),
            name: "Backend".to_string(),
            description: None,
            components: Some(vec!["api".to_string(), "db".to_string()]),
            x: None,
            y: None,
            width: None,
            height: None,
        }]);
        model.threats = Some(vec![Threat {
            r#ref: "T01".to_string(),
            name: "Injection".to_string(),
            description: None,
            affected_components: Some(vec!["db".to_string()]),
            affected_data_flows: Some(vec!["api->db".to_string()]),
            affected_assets: None,
            status: None,
            status_link: None,
            status_note: None,
        }]);
        model.controls = Some(vec![Control {
            r#ref: "C01".to_string(),
            name: "Prepared statements".to_string(),
            description: None,
            mitigates: Some(vec!["T01".to_string()]),
            implemented_in: Some(vec!["api".to_string(), "db".to_string()]),
            status: None,
            status_link: None,
            status_note: None,
        }]);
        model
    }

    #[test]
    fn test_entity_kind_from_str() {
        assert_eq!("component".parse::<EntityKind>(), Ok(EntityKind::Component));
        assert_eq!("data_flows".parse::<EntityKind>(), Ok(EntityKind::DataFlow));
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_referencing_array_fields() {
        assert_eq!(
            EntityKind::Component.referencing_array_fields(),
            vec!["components", "affected_components", "implemented_in"]
        );
        assert_eq!(
            EntityKind::DataFlow.referencing_array_fields(),
            vec!["affected_data_flows"]
        );
        assert!(EntityKind::Control.referencing_array_fields().is_empty());
    }

    #[test]
    fn test_strip_reference() {
        let mut model = sample();
        let removed = model.strip_reference(EntityKind::Component, "db");
        assert_eq!(removed, 3);
        assert_eq!(
            model.boundary("boundary-1").unwrap().components,
            Some(vec!["api".to_string()])
        );
        assert_eq!(model.threats()[0].affected_components, Some(vec![]));
    }

    #[test]
    fn test_rename_reference_updates_flow_endpoints() {
        let mut model = sample();
        model.rename_reference(EntityKind::Component, "db", "database");
        assert_eq!(model.data_flows()[0].destination, "database");
        assert_eq!(
            model.controls()[0].implemented_in,
            Some(vec!["api".to_string(), "database".to_string()])
        );
    }

    #[test]
    fn test_dangling_references() {
        let mut model = sample();
        assert!(model.dangling_references().is_empty());

        model.remove_entity(EntityKind::Asset, "A01");
        let dangling = model.dangling_references();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].owner, EntityKind::Component);
        assert_eq!(dangling[0].field, "assets");
        assert_eq!(dangling[0].target, "A01");
    }

    #[test]
    fn test_remove_missing_entity_is_noop() {
        let mut model = sample();
        assert!(!model.remove_entity(EntityKind::Threat, "T99"));
        assert!(!model.set_entity_ref(EntityKind::Threat, "T99", "T98"));
        assert_eq!(model, sample());
    }

    #[test]
    fn test_boundary_of() {
        let model = sample();
        assert_eq!(model.boundary_of("db").map(|b| b.r#ref.as_str()), Some("boundary-1"));
        assert!(model.boundary_of("nope").is_none());
    }

    #[test]
    fn test_json_skips_absent_fields() {
        let model = ThreatModel::new("1.0", "Empty");
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, r#"{"schema_version":"1.0","name":"Empty","components":[]}"#);
    }

    #[test]
    fn test_lenient_text_fields() {
        let json = r#"{"schema_version":1.0,"name":2024,"components":[{"ref":7,"name":true}]}"#;
        let model: ThreatModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.schema_version, "1.0");
        assert_eq!(model.name, "2024");
        assert_eq!(model.components[0].r#ref, "7");
        assert_eq!(model.components[0].name, "true");
    }

    #[test]
    fn test_external_dependency_alias() {
        let json = r#"{"ref":"x","name":"X","component_type":"external_dependency"}"#;
        let component: Component = serde_json::from_str(json).unwrap();
        assert_eq!(component.component_type, ComponentType::External);
    }
}
