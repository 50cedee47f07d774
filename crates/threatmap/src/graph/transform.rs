use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use threatmap_core::{
    geometry::{Bounds, Point, Size},
    model::{Boundary, ThreatModel},
};

use super::{Edge, Graph, Node, NodeKind, layer_nodes};
use crate::config::LayoutConfig;

/// Builds the graph for `model`.
///
/// The result depends only on the model and the layout settings. Nodes come
/// back in render order with nothing selected; see [`layer_nodes`].
///
/// # Examples
///
/// ```
/// # use threatmap::{config::LayoutConfig, graph::transform_threat_model};
/// # use threatmap_core::model::{Component, ThreatModel};
/// let mut model = ThreatModel::new("1.0", "Demo");
/// model.components.push(Component::new("api", "API"));
///
/// let graph = transform_threat_model(&model, &LayoutConfig::default());
/// assert_eq!(graph.nodes[0].id, "api");
/// assert_eq!(graph.nodes[0].position.x(), 100.0);
/// ```
pub fn transform_threat_model(model: &ThreatModel, layout: &LayoutConfig) -> Graph {
    let components: Vec<Node> = model
        .components
        .iter()
        .enumerate()
        .map(|(idx, component)| {
            let fallback = layout.cascade_position(idx);
            Node {
                id: component.r#ref.clone(),
                kind: NodeKind::Component,
                label: component.name.clone(),
                position: Point::new(
                    component.x.unwrap_or(fallback.x()),
                    component.y.unwrap_or(fallback.y()),
                ),
                size: layout.component_size(),
                component_type: Some(component.component_type),
                description: component.description.clone(),
                selected: false,
                z_index: 0,
            }
        })
        .collect();

    let footprints: HashMap<&str, Bounds> = components
        .iter()
        .map(|node| (node.id.as_str(), node.bounds()))
        .collect();

    let mut nodes: Vec<Node> = model
        .boundaries()
        .iter()
        .map(|boundary| boundary_node(boundary, &footprints, layout))
        .collect();
    nodes.extend(components);

    let edges = model.data_flows().iter().map(Edge::from).collect();

    layer_nodes(&mut nodes, &HashSet::new());
    debug!(nodes = nodes.len(); "Graph derived from model");
    Graph { nodes, edges }
}

/// Places a boundary from its explicit geometry, or around its components.
fn boundary_node(
    boundary: &Boundary,
    footprints: &HashMap<&str, Bounds>,
    layout: &LayoutConfig,
) -> Node {
    let bounds = match boundary.explicit_geometry() {
        Some((x, y, width, height)) => {
            Bounds::new_from_top_left(Point::new(x, y), Size::new(width, height))
        }
        None => derived_bounds(boundary, footprints, layout),
    };

    Node {
        id: boundary.r#ref.clone(),
        kind: NodeKind::Boundary,
        label: boundary.name.clone(),
        position: bounds.min_point(),
        size: bounds.to_size(),
        component_type: None,
        description: boundary.description.clone(),
        selected: false,
        z_index: 0,
    }
}

fn derived_bounds(
    boundary: &Boundary,
    footprints: &HashMap<&str, Bounds>,
    layout: &LayoutConfig,
) -> Bounds {
    let resolved = boundary
        .components
        .iter()
        .flatten()
        .filter_map(|r| footprints.get(r.as_str()))
        .copied()
        .reduce(|acc, b| acc.merge(&b));

    match resolved {
        Some(bounds) => bounds.expand(layout.boundary_padding()),
        None => {
            trace!(boundary = boundary.r#ref.as_str(); "No resolvable components, using default box");
            Bounds::new_from_top_left(layout.default_origin(), layout.default_boundary_size())
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use threatmap_core::model::{Component, DataFlow, Direction};

    use super::*;

    fn component_at(r: &str, x: f64, y: f64) -> Component {
        let mut component = Component::new(r, r.to_uppercase());
        component.x = Some(x);
        component.y = Some(y);
        component
    }

    fn boundary(r: &str, components: &[&str]) -> Boundary {
        Boundary {
            r#ref: r.to_string(),
            name: r.to_string(),
            description: None,
            components: Some(components.iter().map(|c| c.to_string()).collect()),
            x: None,
            y: None,
            width: None,
            height: None,
        }
    }

    #[test]
    fn test_components_cascade_without_coordinates() {
        let mut model = ThreatModel::new("1.0", "Demo");
        model.components.push(Component::new("a", "A"));
        model.components.push(Component::new("b", "B"));

        let graph = transform_threat_model(&model, &LayoutConfig::default());
        let b = graph.node("b").unwrap();
        assert_approx_eq!(f64, b.position.x(), 250.0);
        assert_approx_eq!(f64, b.position.y(), 250.0);
        assert_approx_eq!(f64, b.size.width(), 140.0);
        assert_approx_eq!(f64, b.size.height(), 80.0);
    }

    #[test]
    fn test_derived_boundary_wraps_components() {
        let mut model = ThreatModel::new("1.0", "Demo");
        model.components.push(component_at("a", 100.0, 100.0));
        model.components.push(component_at("b", 300.0, 200.0));
        model.boundaries = Some(vec![boundary("zone", &["a", "b"])]);

        let graph = transform_threat_model(&model, &LayoutConfig::default());
        let zone = graph.node("zone").unwrap();
        assert!(zone.position.x() < 100.0);
        assert!(zone.position.y() < 100.0);
        assert!(zone.size.width() > 200.0);
        assert!(zone.size.height() > 100.0);

        assert_approx_eq!(f64, zone.position.x(), 60.0);
        assert_approx_eq!(f64, zone.position.y(), 60.0);
        assert_approx_eq!(f64, zone.size.width(), 420.0);
        assert_approx_eq!(f64, zone.size.height(), 260.0);
    }

    #[test]
    fn test_boundary_fallbacks() {
        let mut model = ThreatModel::new("1.0", "Demo");
        let mut explicit = boundary("explicit", &[]);
        explicit.x = Some(10.0);
        explicit.y = Some(20.0);
        explicit.width = Some(30.0);
        explicit.height = Some(40.0);
        let mut partial = boundary("partial", &["ghost"]);
        partial.x = Some(999.0);
        model.boundaries = Some(vec![explicit, partial]);

        let graph = transform_threat_model(&model, &LayoutConfig::default());
        let explicit = graph.node("explicit").unwrap();
        assert_eq!(explicit.bounds(), Bounds::new_from_top_left(Point::new(10.0, 20.0), Size::new(30.0, 40.0)));

        let partial = graph.node("partial").unwrap();
        assert_eq!(partial.position, Point::new(100.0, 100.0));
        assert_eq!(partial.size, Size::new(400.0, 300.0));
    }

    #[test]
    fn test_edges_markers_and_handles() {
        let mut model = ThreatModel::new("1.0", "Demo");
        model.components.push(Component::new("a", "A"));
        model.components.push(Component::new("b", "B"));
        model.data_flows = Some(vec![
            DataFlow {
                r#ref: "a->b".to_string(),
                source: "a".to_string(),
                destination: "b".to_string(),
                source_point: Some("right".to_string()),
                destination_point: Some("left".to_string()),
                direction: Direction::Unidirectional,
                label: Some("DF1".to_string()),
            },
            DataFlow {
                r#ref: "a<->ghost".to_string(),
                source: "a".to_string(),
                destination: "ghost".to_string(),
                source_point: None,
                destination_point: None,
                direction: Direction::Bidirectional,
                label: None,
            },
        ]);

        let graph = transform_threat_model(&model, &LayoutConfig::default());
        let uni = graph.edge("a->b").unwrap();
        assert!(uni.marker_end);
        assert!(!uni.marker_start);
        assert_eq!(uni.source_handle.as_deref(), Some("right"));
        assert_eq!(uni.target_handle.as_deref(), Some("target-left"));
        assert_eq!(uni.label.as_deref(), Some("DF1"));

        let bi = graph.edge("a<->ghost").unwrap();
        assert!(bi.marker_start && bi.marker_end);
        assert_eq!(bi.target, "ghost");
    }

    #[test]
    fn test_transform_is_deterministic() {
        let mut model = ThreatModel::new("1.0", "Demo");
        model.components.push(component_at("a", 0.0, 0.0));
        model.boundaries = Some(vec![boundary("outer", &["a"]), boundary("empty", &[])]);

        let layout = LayoutConfig::default();
        assert_eq!(transform_threat_model(&model, &layout), transform_threat_model(&model, &layout));
    }
}
