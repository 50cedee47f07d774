//! The rendered graph of a threat model.
//!
//! A [`Graph`] is derived presentation data: positioned nodes for components
//! and trust boundaries, and edges for data flows. Every node and edge keeps
//! the `ref` of the entity it was built from as its `id`, which is how graph
//! events find their way back into the model.
//!
//! The module is organized into:
//! - **Transformation**: [`transform_threat_model`] builds a graph from a model
//! - **Layering**: [`layer_nodes`] orders nodes for rendering and assigns z-indices
//! - **Membership**: [`compute_membership`] decides which boundary contains each component

use serde::Serialize;

use threatmap_core::{
    geometry::{Bounds, Point, Size},
    model::{ComponentType, DataFlow, Direction},
};

mod layering;
mod membership;
mod transform;

pub use layering::layer_nodes;
pub use membership::compute_membership;
pub use transform::transform_threat_model;

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Component,
    Boundary,
}

/// A positioned node of the diagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// The ref of the component or boundary.
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    /// Top-left corner.
    pub position: Point,
    pub size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub selected: bool,
    /// Render order; higher values draw on top.
    pub z_index: usize,
}

impl Node {
    /// The rectangle covered by the node.
    pub fn bounds(&self) -> Bounds {
        Bounds::new_from_top_left(self.position, self.size)
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    pub fn is_boundary(&self) -> bool {
        self.kind == NodeKind::Boundary
    }
}

/// A data flow drawn between two component nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    /// The ref of the data flow.
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Anchor on the target node, always carrying the `target-` prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub direction: Direction,
    pub marker_start: bool,
    pub marker_end: bool,
}

/// Prefix the rendering layer puts on target-side anchors.
pub const TARGET_HANDLE_PREFIX: &str = "target-";

impl Edge {
    /// Sets both arrow markers from the flow direction.
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
        self.marker_end = true;
        self.marker_start = direction == Direction::Bidirectional;
    }
}

impl From<&DataFlow> for Edge {
    fn from(flow: &DataFlow) -> Self {
        let mut edge = Edge {
            id: flow.r#ref.clone(),
            source: flow.source.clone(),
            target: flow.destination.clone(),
            source_handle: flow.source_point.clone(),
            target_handle: flow
                .destination_point
                .as_ref()
                .map(|point| format!("{TARGET_HANDLE_PREFIX}{point}")),
            label: flow.label.clone(),
            direction: flow.direction,
            marker_start: false,
            marker_end: true,
        };
        edge.set_direction(flow.direction);
        edge
    }
}

/// Nodes in render order plus the edges between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn edge_mut(&mut self, id: &str) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }

    /// Component nodes, in render order.
    pub fn components(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Component)
    }

    /// Boundary nodes, in render order.
    pub fn boundaries(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Boundary)
    }

    /// The node whose center lies closest to `point`.
    pub fn nearest_node(&self, point: Point) -> Option<&Node> {
        self.nodes
            .iter()
            .min_by(|a, b| a.center().distance(point).total_cmp(&b.center().distance(point)))
    }
}
