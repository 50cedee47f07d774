use std::{cmp::Ordering, collections::HashSet};

use log::trace;

use super::{Node, NodeKind};

/// Render tiers, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Boundary,
    Component,
    SelectedBoundary,
}

fn tier(node: &Node) -> Tier {
    match node.kind {
        NodeKind::Component => Tier::Component,
        NodeKind::Boundary if node.selected => Tier::SelectedBoundary,
        NodeKind::Boundary => Tier::Boundary,
    }
}

/// Orders `nodes` for rendering and refreshes their selection flags.
///
/// Boundaries come first, largest area first so nested boundaries stay
/// clickable, then components, then selected boundaries so the one being
/// edited sits on top. The sort is stable, so components keep their
/// relative order. Each node's `z_index` becomes its position.
pub fn layer_nodes(nodes: &mut [Node], selected: &HashSet<String>) {
    for node in nodes.iter_mut() {
        node.selected = selected.contains(&node.id);
    }

    nodes.sort_by(|a, b| {
        tier(a).cmp(&tier(b)).then_with(|| match a.kind {
            NodeKind::Boundary => b.bounds().area().total_cmp(&a.bounds().area()),
            NodeKind::Component => Ordering::Equal,
        })
    });

    for (z_index, node) in nodes.iter_mut().enumerate() {
        node.z_index = z_index;
    }
    trace!(nodes = nodes.len(), selected = selected.len(); "Nodes re-layered");
}

#[cfg(test)]
mod tests {
    use threatmap_core::geometry::{Point, Size};

    use super::*;

    fn node(id: &str, kind: NodeKind, side: f64) -> Node {
        Node {
            id: id.to_string(),
            kind,
            label: id.to_string(),
            position: Point::default(),
            size: Size::new(side, side),
            component_type: None,
            description: None,
            selected: false,
            z_index: 0,
        }
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_boundaries_largest_first_below_components() {
        let mut nodes = vec![
            node("c1", NodeKind::Component, 10.0),
            node("small", NodeKind::Boundary, 50.0),
            node("c2", NodeKind::Component, 10.0),
            node("large", NodeKind::Boundary, 500.0),
        ];
        layer_nodes(&mut nodes, &HashSet::new());
        assert_eq!(ids(&nodes), ["large", "small", "c1", "c2"]);
        assert_eq!(nodes[3].z_index, 3);
    }

    #[test]
    fn test_selected_boundary_on_top() {
        let mut nodes = vec![
            node("large", NodeKind::Boundary, 500.0),
            node("small", NodeKind::Boundary, 50.0),
            node("c1", NodeKind::Component, 10.0),
        ];
        let selected: HashSet<String> = ["large".to_string(), "c1".to_string()].into();
        layer_nodes(&mut nodes, &selected);
        assert_eq!(ids(&nodes), ["small", "c1", "large"]);
        assert!(nodes[2].selected);
        assert!(nodes[1].selected);
        assert!(!nodes[0].selected);
    }

    #[test]
    fn test_resize_changes_order() {
        let mut nodes = vec![
            node("a", NodeKind::Boundary, 100.0),
            node("b", NodeKind::Boundary, 50.0),
        ];
        layer_nodes(&mut nodes, &HashSet::new());
        assert_eq!(ids(&nodes), ["a", "b"]);

        nodes[1].size = Size::new(300.0, 300.0);
        layer_nodes(&mut nodes, &HashSet::new());
        assert_eq!(ids(&nodes), ["b", "a"]);
    }
}
