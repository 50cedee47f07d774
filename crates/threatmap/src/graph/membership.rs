use indexmap::IndexMap;
use log::debug;

use threatmap_core::model::ThreatModel;

use super::Graph;

/// Assigns every component to the innermost boundary containing its center.
///
/// Geometry comes from the live `graph`, so a drag or resize that has not
/// been re-derived yet still counts. The result has one entry per model
/// boundary, in document order, listing member refs in component order.
/// A component inside nested boundaries belongs only to the one with the
/// smallest area; on a tie the earlier boundary wins.
pub fn compute_membership(model: &ThreatModel, graph: &Graph) -> IndexMap<String, Vec<String>> {
    let mut membership: IndexMap<String, Vec<String>> = model
        .boundaries()
        .iter()
        .map(|b| (b.r#ref.clone(), Vec::new()))
        .collect();

    let boundaries: Vec<_> = membership
        .keys()
        .filter_map(|r| graph.node(r))
        .map(|node| (node.id.clone(), node.bounds()))
        .collect();

    for component in &model.components {
        let Some(node) = graph.node(&component.r#ref) else {
            continue;
        };
        let center = node.center();
        let innermost = boundaries
            .iter()
            .filter(|(_, bounds)| bounds.contains(center))
            .min_by(|(_, a), (_, b)| a.area().total_cmp(&b.area()))
            .map(|(boundary_ref, _)| boundary_ref);

        if let Some(members) = innermost.and_then(|r| membership.get_mut(r)) {
            members.push(component.r#ref.clone());
        }
    }

    debug!(boundaries = membership.len(); "Boundary membership computed");
    membership
}

#[cfg(test)]
mod tests {
    use threatmap_core::model::{Boundary, Component};

    use super::*;
    use crate::{config::LayoutConfig, graph::transform_threat_model};

    fn boxed(r: &str, x: f64, y: f64, side: f64) -> Boundary {
        Boundary {
            r#ref: r.to_string(),
            name: r.to_string(),
            description: None,
            components: None,
            x: Some(x),
            y: Some(y),
            width: Some(side),
            height: Some(side),
        }
    }

    fn placed(r: &str, x: f64, y: f64) -> Component {
        let mut component = Component::new(r, r);
        component.x = Some(x);
        component.y = Some(y);
        component
    }

    #[test]
    fn test_innermost_boundary_wins() {
        let mut model = ThreatModel::new("1.0", "Demo");
        model.components.push(placed("inner-c", 120.0, 120.0));
        model.components.push(placed("outer-c", 600.0, 600.0));
        model.components.push(placed("loose", 2000.0, 2000.0));
        model.boundaries = Some(vec![boxed("outer", 0.0, 0.0, 1000.0), boxed("inner", 100.0, 100.0, 300.0)]);

        let graph = transform_threat_model(&model, &LayoutConfig::default());
        let membership = compute_membership(&model, &graph);

        assert_eq!(membership.keys().collect::<Vec<_>>(), ["outer", "inner"]);
        assert_eq!(membership["outer"], ["outer-c"]);
        assert_eq!(membership["inner"], ["inner-c"]);
    }
}
