use std::{collections::HashSet, rc::Rc, time::Instant};

use log::{debug, info, trace};

use threatmap_core::{
    geometry::{Bounds, Point, Size},
    identifier::{
        default_boundary_name, default_component_name, default_control_name,
        default_data_flow_label, default_threat_name, default_asset_name,
        generate_data_flow_ref, next_asset_ref, next_boundary_ref, next_component_ref,
        next_control_ref, next_threat_ref,
    },
    model::{
        Asset, Boundary, Component, ComponentType, Control, DataFlow, Direction, EntityKind,
        RELATIONSHIPS, Threat, ThreatModel,
    },
};
use threatmap_yaml::{Regeneration, parse, patch::Batch, regenerate_all_refs, scalar::Value};

use super::{
    debounce::Debounce,
    events::{Connection, GraphEvent},
    history::{History, Snapshot},
};
use crate::{
    config::AppConfig,
    error::ThreatmapError,
    graph::{Edge, Graph, NodeKind, compute_membership, layer_nodes, transform_threat_model},
};

/// Which status field of a threat or control to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Status,
    Link,
    Note,
}

impl StatusField {
    fn key(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Link => "status_link",
            Self::Note => "status_note",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GestureKind {
    Drag,
    Nudge,
    Resize,
}

/// An interactive edit whose model commit is still pending.
#[derive(Debug)]
struct Gesture {
    kind: GestureKind,
    snapshot: Snapshot,
    touched: Vec<String>,
}

/// Geometry read back from the graph when a gesture commits.
enum GeometryChange {
    Component { r#ref: String, position: Point },
    Boundary { r#ref: String, bounds: Bounds },
}

/// The editing session for one threat-model document.
///
/// Holds the model, its YAML source and the rendered graph, and keeps them
/// consistent across every edit. Operations that name an entity that does
/// not exist do nothing and return `false` or `None`.
///
/// # Examples
///
/// ```
/// # use threatmap::{config::AppConfig, sync::{Connection, Editor}};
/// let yaml = "schema_version: '1.0'\nname: Demo\ncomponents:\n  - ref: web\n    name: Web\n  - ref: db\n    name: DB\n";
/// let mut editor = Editor::new(yaml, AppConfig::default()).unwrap();
///
/// let flow = editor.connect(Connection::new("web", "db")).unwrap();
/// assert_eq!(flow, "web->db");
/// assert!(editor.yaml().contains("  - ref: web->db\n"));
///
/// assert!(editor.undo());
/// assert_eq!(editor.yaml(), yaml);
/// ```
#[derive(Debug)]
pub struct Editor {
    config: AppConfig,
    model: Rc<ThreatModel>,
    yaml: Rc<str>,
    graph: Graph,
    selection: Vec<String>,
    history: History,
    gesture: Option<Gesture>,
    nudge_settle: Debounce<()>,
}

impl Editor {
    /// Opens `yaml` for editing.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] when the document does not parse.
    pub fn new(yaml: impl Into<String>, config: AppConfig) -> Result<Self, ThreatmapError> {
        let yaml: String = yaml.into();
        let model = parse(&yaml).map_err(|err| ThreatmapError::new_parse_error(err, yaml.as_str()))?;
        let graph = transform_threat_model(&model, config.layout());

        info!(
            components = model.components.len(),
            boundaries = model.boundaries().len(),
            data_flows = model.data_flows().len();
            "Editor opened document"
        );
        Ok(Self {
            history: History::new(config.history().max_depth()),
            nudge_settle: Debounce::new(config.interaction().nudge_settle()),
            model: Rc::new(model),
            yaml: Rc::from(yaml),
            graph,
            selection: Vec::new(),
            gesture: None,
            config,
        })
    }

    pub fn model(&self) -> &ThreatModel {
        &self.model
    }

    /// The current document text.
    pub fn yaml(&self) -> &str {
        &self.yaml
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Selected node and edge ids.
    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Whether a drag, nudge burst or resize is waiting to be committed.
    pub fn has_pending_gesture(&self) -> bool {
        self.gesture.is_some()
    }

    /// Applies one event from the rendering layer.
    pub fn handle_event(&mut self, event: GraphEvent, now: Instant) {
        trace!(event:? = event; "Graph event");
        match event {
            GraphEvent::DragStart { id } => {
                if self.graph.node(&id).is_some() {
                    self.begin_gesture(GestureKind::Drag);
                }
            }
            GraphEvent::Drag { id, position } => self.move_node(GestureKind::Drag, &id, position),
            GraphEvent::DragStop { id, position } => {
                self.move_node(GestureKind::Drag, &id, position);
                self.finish_gesture();
            }
            GraphEvent::Nudge { id, dx, dy } => {
                if let Some(position) = self.graph.node(&id).map(|n| n.position) {
                    let target = position.add_point(Point::new(dx, dy));
                    self.move_node(GestureKind::Nudge, &id, target);
                }
            }
            GraphEvent::NudgeEnd => {
                if self.gesture_kind() == Some(GestureKind::Nudge) {
                    self.nudge_settle.schedule((), now);
                }
            }
            GraphEvent::ResizeStart { id } => {
                if self.graph.node(&id).is_some_and(|n| n.is_boundary()) {
                    self.begin_gesture(GestureKind::Resize);
                }
            }
            GraphEvent::Resize { id, bounds } => self.resize_node(&id, bounds),
            GraphEvent::ResizeEnd { id, bounds } => {
                self.resize_node(&id, bounds);
                self.finish_gesture();
            }
            GraphEvent::Connect(connection) => {
                self.connect(connection);
            }
            GraphEvent::Reconnect { edge, connection } => {
                self.reconnect(&edge, connection);
            }
            GraphEvent::Delete { nodes, edges } => {
                self.delete(&nodes, &edges);
            }
            GraphEvent::Select { ids } => self.select(ids),
        }
    }

    /// Commits a nudge burst once its settle window has passed.
    pub fn tick(&mut self, now: Instant) {
        if self.nudge_settle.poll(now).is_some() {
            debug!("Nudge burst settled");
            self.finish_gesture();
        }
    }

    /// Commits any pending gesture immediately.
    pub fn flush(&mut self) {
        self.finish_gesture();
    }

    /// Replaces the selection and re-layers the nodes.
    pub fn select(&mut self, ids: Vec<String>) {
        self.selection = ids
            .into_iter()
            .filter(|id| self.graph.node(id).is_some() || self.graph.edge(id).is_some())
            .collect();
        self.relayer();
    }

    /// Creates a data flow from a connection gesture.
    ///
    /// Returns the new flow's ref, or `None` for self-loops and unknown
    /// endpoints.
    pub fn connect(&mut self, connection: Connection) -> Option<String> {
        self.finish_gesture();
        let connection = connection.normalized();
        if connection.is_self_loop() {
            debug!(component = connection.source.as_str(); "Rejected self-loop connection");
            return None;
        }
        if !self.model.contains(EntityKind::Component, &connection.source)
            || !self.model.contains(EntityKind::Component, &connection.destination)
        {
            return None;
        }

        let flow = DataFlow {
            r#ref: generate_data_flow_ref(
                &connection.source,
                &connection.destination,
                Direction::Unidirectional,
                self.model.refs(EntityKind::DataFlow),
            ),
            source: connection.source,
            destination: connection.destination,
            source_point: connection.source_point,
            destination_point: connection.destination_point,
            direction: Direction::Unidirectional,
            label: Some(default_data_flow_label(self.model.data_flows().len())),
        };

        self.record();
        Rc::make_mut(&mut self.model)
            .data_flows
            .get_or_insert_with(Vec::new)
            .push(flow.clone());
        self.apply_patches(Batch::new().append_item(
            EntityKind::DataFlow.collection(),
            data_flow_fields(&flow),
        ));
        self.graph.edges.push(Edge::from(&flow));

        info!(flow = flow.r#ref.as_str(); "Data flow connected");
        Some(flow.r#ref)
    }

    /// Moves an existing flow to new endpoints.
    ///
    /// When the endpoints change the flow gets a ref derived from them, and
    /// every `affected_data_flows` entry follows. Returns the flow's ref
    /// after the change.
    pub fn reconnect(&mut self, edge: &str, connection: Connection) -> Option<String> {
        self.finish_gesture();
        let connection = connection.normalized();
        if connection.is_self_loop() {
            return None;
        }
        let flow = self.model.data_flow(edge)?.clone();
        if !self.model.contains(EntityKind::Component, &connection.source)
            || !self.model.contains(EntityKind::Component, &connection.destination)
        {
            return None;
        }

        let endpoints_changed =
            flow.source != connection.source || flow.destination != connection.destination;
        let new_ref = if endpoints_changed {
            let others: Vec<&str> = self
                .model
                .refs(EntityKind::DataFlow)
                .into_iter()
                .filter(|r| *r != edge)
                .collect();
            generate_data_flow_ref(&connection.source, &connection.destination, flow.direction, others)
        } else {
            flow.r#ref.clone()
        };

        self.record();
        let collection = EntityKind::DataFlow.collection();
        let mut batch = Batch::new()
            .update_field(collection, edge, "source", Value::text(&connection.source))
            .update_field(collection, edge, "destination", Value::text(&connection.destination));
        batch = match &connection.source_point {
            Some(point) => batch.update_field(collection, edge, "source_point", Value::text(point)),
            None => batch.remove_field(collection, edge, "source_point"),
        };
        batch = match &connection.destination_point {
            Some(point) => batch.update_field(collection, edge, "destination_point", Value::text(point)),
            None => batch.remove_field(collection, edge, "destination_point"),
        };

        let model = Rc::make_mut(&mut self.model);
        if let Some(target) = model.data_flow_mut(edge) {
            target.source = connection.source;
            target.destination = connection.destination;
            target.source_point = connection.source_point;
            target.destination_point = connection.destination_point;
        }
        if new_ref != edge {
            model.set_entity_ref(EntityKind::DataFlow, edge, &new_ref);
            model.rename_reference(EntityKind::DataFlow, edge, &new_ref);
            batch = batch.rename_ref(collection, edge, &new_ref).replace_in_arrays(
                &EntityKind::DataFlow.referencing_array_fields(),
                edge,
                &new_ref,
            );
            for id in self.selection.iter_mut().filter(|id| id.as_str() == edge) {
                *id = new_ref.clone();
            }
        }

        self.apply_patches(batch);
        self.rebuild_graph();
        info!(old = edge, new = new_ref.as_str(); "Data flow reconnected");
        Some(new_ref)
    }

    /// Deletes nodes and edges in one step.
    ///
    /// Components take their flows and every reference to them along.
    /// Boundaries are removed alone; their components stay. Afterwards the
    /// node nearest to the centroid of the deleted items is selected.
    pub fn delete(&mut self, nodes: &[String], edges: &[String]) -> bool {
        self.finish_gesture();
        let mut targets: Vec<(EntityKind, &str)> = Vec::new();
        let mut centers = Vec::new();
        for id in nodes {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let kind = match node.kind {
                NodeKind::Component => EntityKind::Component,
                NodeKind::Boundary => EntityKind::Boundary,
            };
            targets.push((kind, id.as_str()));
            centers.push(node.center());
        }
        for id in edges {
            let Some(edge) = self.graph.edge(id) else {
                continue;
            };
            if let (Some(source), Some(target)) = (self.graph.node(&edge.source), self.graph.node(&edge.target)) {
                centers.push(source.center().midpoint(target.center()));
            }
            targets.push((EntityKind::DataFlow, id.as_str()));
        }
        if targets.is_empty() {
            return false;
        }
        let centroid = Point::centroid(centers);

        self.record();
        let mut batch = Batch::new();
        for (kind, entity_ref) in &targets {
            batch = self.remove_with_references(*kind, entity_ref, batch);
        }
        self.apply_patches(batch);

        self.selection.clear();
        self.rebuild_graph();
        if let Some(nearest) = centroid.and_then(|c| self.graph.nearest_node(c)) {
            self.selection.push(nearest.id.clone());
            self.relayer();
        }
        info!(removed = targets.len(); "Deleted from diagram");
        true
    }

    /// Removes one entity and cleans every reference to it.
    pub fn remove_entity(&mut self, kind: EntityKind, entity_ref: &str) -> bool {
        self.finish_gesture();
        if !self.model.contains(kind, entity_ref) {
            return false;
        }
        self.record();
        let batch = self.remove_with_references(kind, entity_ref, Batch::new());
        self.apply_patches(batch);
        self.selection.retain(|id| id != entity_ref);
        self.rebuild_graph();
        info!(kind:% = kind, entity_ref = entity_ref; "Entity removed");
        true
    }

    /// Adds a component at `position`, or at the next cascade slot.
    pub fn add_component(&mut self, position: Option<Point>) -> String {
        self.finish_gesture();
        let count = self.model.components.len();
        let entity_ref = next_component_ref(self.model.refs(EntityKind::Component));
        let position = position
            .unwrap_or_else(|| self.config.layout().cascade_position(count))
            .round();

        let mut component = Component::new(entity_ref.as_str(), default_component_name(count));
        component.x = Some(position.x());
        component.y = Some(position.y());
        let fields = vec![
            field("ref", Value::text(&component.r#ref)),
            field("name", Value::text(&component.name)),
            field("component_type", Value::text(component.component_type.as_str())),
            field("x", Value::Number(position.x())),
            field("y", Value::Number(position.y())),
        ];

        self.record();
        Rc::make_mut(&mut self.model).components.push(component);
        self.apply_patches(Batch::new().append_item(EntityKind::Component.collection(), fields));
        self.selection = vec![entity_ref.clone()];
        self.rebuild_graph();
        info!(entity_ref = entity_ref.as_str(); "Component added");
        entity_ref
    }

    /// Adds a boundary. With `bounds` its geometry is stored and membership
    /// is recomputed; without, it gets the default box.
    pub fn add_boundary(&mut self, bounds: Option<Bounds>) -> String {
        self.finish_gesture();
        let count = self.model.boundaries().len();
        let entity_ref = next_boundary_ref(self.model.refs(EntityKind::Boundary));
        let mut boundary = Boundary {
            r#ref: entity_ref.clone(),
            name: default_boundary_name(count),
            description: None,
            components: None,
            x: None,
            y: None,
            width: None,
            height: None,
        };
        let mut fields = vec![
            field("ref", Value::text(&boundary.r#ref)),
            field("name", Value::text(&boundary.name)),
        ];
        if let Some(bounds) = bounds {
            let (x, y, width, height) = rounded(bounds);
            boundary.x = Some(x);
            boundary.y = Some(y);
            boundary.width = Some(width);
            boundary.height = Some(height);
            fields.extend([
                field("x", Value::Number(x)),
                field("y", Value::Number(y)),
                field("width", Value::Number(width)),
                field("height", Value::Number(height)),
            ]);
        }

        self.record();
        Rc::make_mut(&mut self.model)
            .boundaries
            .get_or_insert_with(Vec::new)
            .push(boundary);
        let mut batch = Batch::new().append_item(EntityKind::Boundary.collection(), fields);
        self.selection = vec![entity_ref.clone()];
        self.rebuild_graph();
        if bounds.is_some() {
            batch = self.sync_membership(batch);
        }
        self.apply_patches(batch);
        self.rebuild_graph();
        info!(entity_ref = entity_ref.as_str(); "Boundary added");
        entity_ref
    }

    pub fn add_asset(&mut self) -> String {
        self.finish_gesture();
        let entity_ref = next_asset_ref(self.model.refs(EntityKind::Asset));
        let asset = Asset {
            name: default_asset_name(&entity_ref),
            r#ref: entity_ref.clone(),
            description: None,
        };
        let fields = vec![
            field("ref", Value::text(&asset.r#ref)),
            field("name", Value::text(&asset.name)),
        ];
        self.record();
        Rc::make_mut(&mut self.model)
            .assets
            .get_or_insert_with(Vec::new)
            .push(asset);
        self.apply_patches(Batch::new().append_item(EntityKind::Asset.collection(), fields));
        info!(entity_ref = entity_ref.as_str(); "Asset added");
        entity_ref
    }

    pub fn add_threat(&mut self) -> String {
        self.finish_gesture();
        let entity_ref = next_threat_ref(self.model.refs(EntityKind::Threat));
        let threat = Threat {
            name: default_threat_name(&entity_ref),
            r#ref: entity_ref.clone(),
            description: None,
            affected_components: None,
            affected_data_flows: None,
            affected_assets: None,
            status: None,
            status_link: None,
            status_note: None,
        };
        let fields = vec![
            field("ref", Value::text(&threat.r#ref)),
            field("name", Value::text(&threat.name)),
        ];
        self.record();
        Rc::make_mut(&mut self.model)
            .threats
            .get_or_insert_with(Vec::new)
            .push(threat);
        self.apply_patches(Batch::new().append_item(EntityKind::Threat.collection(), fields));
        info!(entity_ref = entity_ref.as_str(); "Threat added");
        entity_ref
    }

    pub fn add_control(&mut self) -> String {
        self.finish_gesture();
        let entity_ref = next_control_ref(self.model.refs(EntityKind::Control));
        let control = Control {
            name: default_control_name(&entity_ref),
            r#ref: entity_ref.clone(),
            description: None,
            mitigates: None,
            implemented_in: None,
            status: None,
            status_link: None,
            status_note: None,
        };
        let fields = vec![
            field("ref", Value::text(&control.r#ref)),
            field("name", Value::text(&control.name)),
        ];
        self.record();
        Rc::make_mut(&mut self.model)
            .controls
            .get_or_insert_with(Vec::new)
            .push(control);
        self.apply_patches(Batch::new().append_item(EntityKind::Control.collection(), fields));
        info!(entity_ref = entity_ref.as_str(); "Control added");
        entity_ref
    }

    /// Renames an entity. For a data flow this sets its label.
    pub fn rename_entity(&mut self, kind: EntityKind, entity_ref: &str, name: &str) -> bool {
        if kind == EntityKind::DataFlow {
            return self.set_label(entity_ref, Some(name));
        }
        self.finish_gesture();
        if !self.model.contains(kind, entity_ref) {
            return false;
        }

        self.record();
        if let Some(slot) = name_mut(Rc::make_mut(&mut self.model), kind, entity_ref) {
            *slot = name.to_string();
        }
        self.apply_patches(Batch::new().update_field(
            kind.collection(),
            entity_ref,
            "name",
            Value::text(name),
        ));
        if let Some(node) = self.graph.node_mut(entity_ref) {
            node.label = name.to_string();
        }
        true
    }

    /// Sets or clears the description of any entity except a data flow.
    pub fn set_description(
        &mut self,
        kind: EntityKind,
        entity_ref: &str,
        description: Option<&str>,
    ) -> bool {
        self.finish_gesture();
        if kind == EntityKind::DataFlow || !self.model.contains(kind, entity_ref) {
            return false;
        }

        self.record();
        if let Some(slot) = description_mut(Rc::make_mut(&mut self.model), kind, entity_ref) {
            *slot = description.map(str::to_string);
        }
        self.apply_patches(optional_text_patch(kind, entity_ref, "description", description));
        if let Some(node) = self.graph.node_mut(entity_ref) {
            node.description = description.map(str::to_string);
        }
        true
    }

    pub fn set_component_type(&mut self, entity_ref: &str, component_type: ComponentType) -> bool {
        self.finish_gesture();
        if !self.model.contains(EntityKind::Component, entity_ref) {
            return false;
        }

        self.record();
        if let Some(component) = Rc::make_mut(&mut self.model).component_mut(entity_ref) {
            component.component_type = component_type;
        }
        self.apply_patches(Batch::new().update_field(
            EntityKind::Component.collection(),
            entity_ref,
            "component_type",
            Value::text(component_type.as_str()),
        ));
        if let Some(node) = self.graph.node_mut(entity_ref) {
            node.component_type = Some(component_type);
        }
        true
    }

    /// Changes a flow's direction. The flow keeps its ref.
    pub fn set_direction(&mut self, flow_ref: &str, direction: Direction) -> bool {
        self.finish_gesture();
        if !self.model.contains(EntityKind::DataFlow, flow_ref) {
            return false;
        }

        self.record();
        if let Some(flow) = Rc::make_mut(&mut self.model).data_flow_mut(flow_ref) {
            flow.direction = direction;
        }
        self.apply_patches(Batch::new().update_field(
            EntityKind::DataFlow.collection(),
            flow_ref,
            "direction",
            Value::text(direction.as_str()),
        ));
        if let Some(edge) = self.graph.edge_mut(flow_ref) {
            edge.set_direction(direction);
        }
        true
    }

    pub fn set_label(&mut self, flow_ref: &str, label: Option<&str>) -> bool {
        self.finish_gesture();
        if !self.model.contains(EntityKind::DataFlow, flow_ref) {
            return false;
        }

        self.record();
        if let Some(flow) = Rc::make_mut(&mut self.model).data_flow_mut(flow_ref) {
            flow.label = label.map(str::to_string);
        }
        self.apply_patches(optional_text_patch(EntityKind::DataFlow, flow_ref, "label", label));
        if let Some(edge) = self.graph.edge_mut(flow_ref) {
            edge.label = label.map(str::to_string);
        }
        true
    }

    /// Sets or clears a status field of a threat or control.
    pub fn set_status(
        &mut self,
        kind: EntityKind,
        entity_ref: &str,
        field: StatusField,
        value: Option<&str>,
    ) -> bool {
        self.finish_gesture();
        if !matches!(kind, EntityKind::Threat | EntityKind::Control)
            || !self.model.contains(kind, entity_ref)
        {
            return false;
        }

        self.record();
        if let Some(slot) = status_mut(Rc::make_mut(&mut self.model), kind, entity_ref, field) {
            *slot = value.map(str::to_string);
        }
        self.apply_patches(optional_text_patch(kind, entity_ref, field.key(), value));
        true
    }

    /// Replaces a relationship list, such as a threat's
    /// `affected_components`.
    ///
    /// Refs that do not resolve, and repeats, are dropped so the edit never
    /// introduces a dangling reference.
    pub fn set_relationships(
        &mut self,
        kind: EntityKind,
        entity_ref: &str,
        field_name: &str,
        refs: Vec<String>,
    ) -> bool {
        self.finish_gesture();
        let Some(relationship) = RELATIONSHIPS
            .iter()
            .find(|rel| rel.owner == kind && rel.field == field_name && rel.many)
        else {
            return false;
        };
        if !self.model.contains(kind, entity_ref) {
            return false;
        }

        let mut seen = HashSet::new();
        let refs: Vec<String> = refs
            .into_iter()
            .filter(|r| self.model.contains(relationship.target, r))
            .filter(|r| seen.insert(r.clone()))
            .collect();

        self.record();
        if let Some(slot) = ref_list_mut(Rc::make_mut(&mut self.model), kind, entity_ref, field_name) {
            *slot = Some(refs.clone());
        }
        self.apply_patches(Batch::new().update_field(
            kind.collection(),
            entity_ref,
            field_name,
            Value::List(refs),
        ));
        if kind == EntityKind::Boundary {
            self.rebuild_graph();
        }
        true
    }

    /// Loads new document text typed by the user.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] and leaves the editor untouched
    /// when `yaml` does not parse.
    pub fn replace_source(&mut self, yaml: &str) -> Result<(), ThreatmapError> {
        self.finish_gesture();
        if yaml == &*self.yaml {
            return Ok(());
        }
        let model = parse(yaml).map_err(|err| ThreatmapError::new_parse_error(err, yaml))?;

        self.record();
        self.model = Rc::new(model);
        self.yaml = Rc::from(yaml);
        self.rebuild_graph();
        let graph = &self.graph;
        self.selection
            .retain(|id| graph.node(id).is_some() || graph.edge(id).is_some());
        self.relayer();
        info!(bytes = yaml.len(); "Document source replaced");
        Ok(())
    }

    /// Rebuilds every ref from the current names and reloads the result.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] when the current text does not
    /// parse.
    pub fn regenerate_refs(&mut self) -> Result<Regeneration, ThreatmapError> {
        self.finish_gesture();
        let regeneration = regenerate_all_refs(&self.yaml)
            .map_err(|err| ThreatmapError::new_parse_error(err, self.yaml.to_string()))?;
        if regeneration.yaml == *self.yaml {
            return Ok(regeneration);
        }
        let model = parse(&regeneration.yaml)
            .map_err(|err| ThreatmapError::new_parse_error(err, regeneration.yaml.as_str()))?;

        self.record();
        self.model = Rc::new(model);
        self.yaml = Rc::from(regeneration.yaml.as_str());
        for id in &mut self.selection {
            if let Some(rename) = regeneration.changed().find(|r| r.old == *id) {
                *id = rename.new.clone();
            }
        }
        self.rebuild_graph();
        info!(renamed = regeneration.changed().count(); "Refs regenerated");
        Ok(regeneration)
    }

    /// Restores the state before the last mutation.
    pub fn undo(&mut self) -> bool {
        self.finish_gesture();
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(previous) => {
                self.restore(previous);
                debug!("Undo");
                true
            }
            None => false,
        }
    }

    /// Re-applies the last undone mutation.
    pub fn redo(&mut self) -> bool {
        self.finish_gesture();
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(next) => {
                self.restore(next);
                debug!("Redo");
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            model: Rc::clone(&self.model),
            yaml: Rc::clone(&self.yaml),
            selection: self.selection.clone(),
        }
    }

    fn record(&mut self) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.model = snapshot.model;
        self.yaml = snapshot.yaml;
        self.selection = snapshot.selection;
        self.rebuild_graph();
    }

    fn apply_patches(&mut self, batch: Batch) {
        if batch.is_empty() {
            return;
        }
        let patched = batch.apply(&self.yaml);
        trace!(patches = batch.len(); "YAML patched");
        self.yaml = Rc::from(patched);
    }

    fn rebuild_graph(&mut self) {
        self.graph = transform_threat_model(&self.model, self.config.layout());
        self.relayer();
    }

    fn relayer(&mut self) {
        let selected: HashSet<String> = self.selection.iter().cloned().collect();
        layer_nodes(&mut self.graph.nodes, &selected);
    }

    /// Removes an entity from the model and queues the matching text edits.
    /// Components first take every flow touching them.
    fn remove_with_references(&mut self, kind: EntityKind, entity_ref: &str, mut batch: Batch) -> Batch {
        let model = Rc::make_mut(&mut self.model);
        if kind == EntityKind::Component {
            for flow_ref in model.flows_touching(entity_ref) {
                batch = remove_one(model, EntityKind::DataFlow, &flow_ref, batch);
            }
        }
        remove_one(model, kind, entity_ref, batch)
    }

    fn gesture_kind(&self) -> Option<GestureKind> {
        self.gesture.as_ref().map(|g| g.kind)
    }

    /// Starts a gesture, capturing the snapshot it will commit with.
    ///
    /// A new nudge during a running burst cancels the pending commit and
    /// keeps the burst open. A gesture of another kind commits the running
    /// one first.
    fn begin_gesture(&mut self, kind: GestureKind) {
        match self.gesture_kind() {
            Some(current) if current == kind => {
                self.nudge_settle.take();
                return;
            }
            Some(_) => self.finish_gesture(),
            None => {}
        }
        self.gesture = Some(Gesture {
            kind,
            snapshot: self.snapshot(),
            touched: Vec::new(),
        });
    }

    fn touch(&mut self, id: &str) {
        if let Some(gesture) = self.gesture.as_mut() {
            if !gesture.touched.iter().any(|t| t == id) {
                gesture.touched.push(id.to_string());
            }
        }
    }

    fn move_node(&mut self, kind: GestureKind, id: &str, position: Point) {
        if self.graph.node(id).is_none() {
            return;
        }
        self.begin_gesture(kind);
        if let Some(node) = self.graph.node_mut(id) {
            node.position = position;
        }
        self.touch(id);
    }

    fn resize_node(&mut self, id: &str, bounds: Bounds) {
        if !self.graph.node(id).is_some_and(|n| n.is_boundary()) {
            return;
        }
        self.begin_gesture(GestureKind::Resize);
        if let Some(node) = self.graph.node_mut(id) {
            node.position = bounds.min_point();
            node.size = bounds.to_size();
        }
        self.touch(id);
        self.relayer();
    }

    /// Writes the settled geometry of the running gesture to the model and
    /// the text, then recomputes boundary membership.
    fn finish_gesture(&mut self) {
        self.nudge_settle.take();
        let Some(gesture) = self.gesture.take() else {
            return;
        };

        let mut changes = Vec::new();
        for id in &gesture.touched {
            let Some(node) = self.graph.node_mut(id) else {
                continue;
            };
            node.position = node.position.round();
            node.size = Size::new(node.size.width().round(), node.size.height().round());

            match node.kind {
                NodeKind::Component => {
                    let position = node.position;
                    let unchanged = self.model.component(id).is_none_or(|c| {
                        c.x == Some(position.x()) && c.y == Some(position.y())
                    });
                    if !unchanged {
                        changes.push(GeometryChange::Component {
                            r#ref: id.clone(),
                            position,
                        });
                    }
                }
                NodeKind::Boundary => {
                    let bounds = node.bounds();
                    let unchanged = self
                        .model
                        .boundary(id)
                        .is_none_or(|b| b.explicit_geometry() == Some(rounded(bounds)));
                    if !unchanged {
                        changes.push(GeometryChange::Boundary {
                            r#ref: id.clone(),
                            bounds,
                        });
                    }
                }
            }
        }

        if changes.is_empty() {
            self.rebuild_graph();
            return;
        }

        self.history.push(gesture.snapshot);
        let model = Rc::make_mut(&mut self.model);
        let mut batch = Batch::new();
        for change in &changes {
            match change {
                GeometryChange::Component { r#ref, position } => {
                    if let Some(component) = model.component_mut(r#ref) {
                        component.x = Some(position.x());
                        component.y = Some(position.y());
                    }
                    batch = batch
                        .update_field(EntityKind::Component.collection(), r#ref, "x", position.x())
                        .update_field(EntityKind::Component.collection(), r#ref, "y", position.y());
                }
                GeometryChange::Boundary { r#ref, bounds } => {
                    batch = pin_boundary(model, r#ref, *bounds, batch);
                }
            }
        }
        batch = self.sync_membership(batch);
        self.apply_patches(batch);
        self.rebuild_graph();
        info!(
            kind:? = gesture.kind,
            moved = changes.len();
            "Gesture committed"
        );
    }

    /// Corrects every boundary's `components` list to match the live
    /// geometry. A boundary without stored geometry whose members change is
    /// pinned to its current rectangle first.
    fn sync_membership(&mut self, mut batch: Batch) -> Batch {
        let membership = compute_membership(&self.model, &self.graph);
        let model = Rc::make_mut(&mut self.model);

        for (boundary_ref, members) in membership {
            let Some(boundary) = model.boundary(&boundary_ref) else {
                continue;
            };
            let current: HashSet<&str> = boundary
                .components
                .iter()
                .flatten()
                .map(String::as_str)
                .collect();
            let computed: HashSet<&str> = members.iter().map(String::as_str).collect();
            if current == computed {
                continue;
            }

            let live_bounds = boundary
                .explicit_geometry()
                .is_none()
                .then(|| self.graph.node(&boundary_ref).map(|n| n.bounds()))
                .flatten();
            if let Some(bounds) = live_bounds {
                batch = pin_boundary(model, &boundary_ref, bounds, batch);
            }
            debug!(boundary = boundary_ref.as_str(), members = members.len(); "Boundary membership changed");
            if let Some(boundary) = model.boundary_mut(&boundary_ref) {
                boundary.components = Some(members.clone());
            }
            batch = batch.update_field(
                EntityKind::Boundary.collection(),
                &boundary_ref,
                "components",
                Value::List(members),
            );
        }
        batch
    }
}

fn field(key: &str, value: Value) -> (String, Value) {
    (key.to_string(), value)
}

fn data_flow_fields(flow: &DataFlow) -> Vec<(String, Value)> {
    let mut fields = vec![
        field("ref", Value::text(&flow.r#ref)),
        field("source", Value::text(&flow.source)),
        field("destination", Value::text(&flow.destination)),
    ];
    if let Some(point) = &flow.source_point {
        fields.push(field("source_point", Value::text(point)));
    }
    if let Some(point) = &flow.destination_point {
        fields.push(field("destination_point", Value::text(point)));
    }
    fields.push(field("direction", Value::text(flow.direction.as_str())));
    if let Some(label) = &flow.label {
        fields.push(field("label", Value::text(label)));
    }
    fields
}

fn rounded(bounds: Bounds) -> (f64, f64, f64, f64) {
    (
        bounds.min_x().round(),
        bounds.min_y().round(),
        bounds.width().round(),
        bounds.height().round(),
    )
}

/// Stores `bounds` as the boundary's explicit geometry.
fn pin_boundary(model: &mut ThreatModel, boundary_ref: &str, bounds: Bounds, batch: Batch) -> Batch {
    let (x, y, width, height) = rounded(bounds);
    if let Some(boundary) = model.boundary_mut(boundary_ref) {
        boundary.x = Some(x);
        boundary.y = Some(y);
        boundary.width = Some(width);
        boundary.height = Some(height);
    }
    let collection = EntityKind::Boundary.collection();
    batch
        .update_field(collection, boundary_ref, "x", x)
        .update_field(collection, boundary_ref, "y", y)
        .update_field(collection, boundary_ref, "width", width)
        .update_field(collection, boundary_ref, "height", height)
}

fn remove_one(model: &mut ThreatModel, kind: EntityKind, entity_ref: &str, batch: Batch) -> Batch {
    if !model.remove_entity(kind, entity_ref) {
        return batch;
    }
    let stripped = model.strip_reference(kind, entity_ref);
    trace!(kind:% = kind, entity_ref = entity_ref, stripped = stripped; "Entity and references removed");
    batch
        .remove_item(kind.collection(), entity_ref)
        .strip_ref(&kind.referencing_array_fields(), entity_ref)
}

fn optional_text_patch(kind: EntityKind, entity_ref: &str, key: &str, value: Option<&str>) -> Batch {
    match value {
        Some(value) => Batch::new().update_field(kind.collection(), entity_ref, key, Value::text(value)),
        None => Batch::new().remove_field(kind.collection(), entity_ref, key),
    }
}

fn name_mut<'m>(model: &'m mut ThreatModel, kind: EntityKind, entity_ref: &str) -> Option<&'m mut String> {
    match kind {
        EntityKind::Component => model.component_mut(entity_ref).map(|e| &mut e.name),
        EntityKind::Boundary => model.boundary_mut(entity_ref).map(|e| &mut e.name),
        EntityKind::Asset => model.asset_mut(entity_ref).map(|e| &mut e.name),
        EntityKind::Threat => model.threat_mut(entity_ref).map(|e| &mut e.name),
        EntityKind::Control => model.control_mut(entity_ref).map(|e| &mut e.name),
        EntityKind::DataFlow => None,
    }
}

fn description_mut<'m>(
    model: &'m mut ThreatModel,
    kind: EntityKind,
    entity_ref: &str,
) -> Option<&'m mut Option<String>> {
    match kind {
        EntityKind::Component => model.component_mut(entity_ref).map(|e| &mut e.description),
        EntityKind::Boundary => model.boundary_mut(entity_ref).map(|e| &mut e.description),
        EntityKind::Asset => model.asset_mut(entity_ref).map(|e| &mut e.description),
        EntityKind::Threat => model.threat_mut(entity_ref).map(|e| &mut e.description),
        EntityKind::Control => model.control_mut(entity_ref).map(|e| &mut e.description),
        EntityKind::DataFlow => None,
    }
}

fn status_mut<'m>(
    model: &'m mut ThreatModel,
    kind: EntityKind,
    entity_ref: &str,
    field: StatusField,
) -> Option<&'m mut Option<String>> {
    match kind {
        EntityKind::Threat => model.threat_mut(entity_ref).map(|t| match field {
            StatusField::Status => &mut t.status,
            StatusField::Link => &mut t.status_link,
            StatusField::Note => &mut t.status_note,
        }),
        EntityKind::Control => model.control_mut(entity_ref).map(|c| match field {
            StatusField::Status => &mut c.status,
            StatusField::Link => &mut c.status_link,
            StatusField::Note => &mut c.status_note,
        }),
        _ => None,
    }
}

fn ref_list_mut<'m>(
    model: &'m mut ThreatModel,
    kind: EntityKind,
    entity_ref: &str,
    field_name: &str,
) -> Option<&'m mut Option<Vec<String>>> {
    match (kind, field_name) {
        (EntityKind::Component, "assets") => model.component_mut(entity_ref).map(|e| &mut e.assets),
        (EntityKind::Boundary, "components") => {
            model.boundary_mut(entity_ref).map(|e| &mut e.components)
        }
        (EntityKind::Threat, "affected_components") => {
            model.threat_mut(entity_ref).map(|e| &mut e.affected_components)
        }
        (EntityKind::Threat, "affected_data_flows") => {
            model.threat_mut(entity_ref).map(|e| &mut e.affected_data_flows)
        }
        (EntityKind::Threat, "affected_assets") => {
            model.threat_mut(entity_ref).map(|e| &mut e.affected_assets)
        }
        (EntityKind::Control, "mitigates") => model.control_mut(entity_ref).map(|e| &mut e.mitigates),
        (EntityKind::Control, "implemented_in") => {
            model.control_mut(entity_ref).map(|e| &mut e.implemented_in)
        }
        _ => None,
    }
}
