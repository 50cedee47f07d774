//! Integration tests for the DocumentBuilder API

use threatmap::{
    DocumentBuilder, ThreatmapError,
    config::AppConfig,
    model::EntityKind,
    share::{self, RepositoryMetadata},
};

const SHOP: &str = r#"schema_version: '1.0'
name: Shop
description: Online storefront
components:
  - ref: web
    name: Web
    x: 100
    y: 100
  - ref: api
    name: API
  - ref: db
    name: Orders DB
    component_type: data_store
assets:
  - ref: A01
    name: Card data
data_flows:
  - ref: web->api
    source: web
    destination: api
    direction: unidirectional
  - ref: api<->db
    source: api
    destination: db
    direction: bidirectional
boundaries:
  - ref: backend
    name: Backend
    components: [api, db]
threats:
  - ref: T01
    name: SQL injection
    affected_components: [api]
    affected_data_flows: [api<->db]
controls:
  - ref: C01
    name: Parameterized queries
    mitigates: [T01]
    implemented_in: [api]
"#;

#[test]
fn test_parse_document() {
    let builder = DocumentBuilder::default();
    let model = builder.parse(SHOP).expect("Failed to parse document");

    assert_eq!(model.name, "Shop");
    assert_eq!(model.components.len(), 3);
    assert_eq!(model.data_flows().len(), 2);
    assert!(model.dangling_references().is_empty());
}

#[test]
fn test_parse_invalid_document_returns_error() {
    let builder = DocumentBuilder::default();
    let result = builder.parse("name: Shop\ncomponents: [");
    assert!(matches!(result, Err(ThreatmapError::Parse { .. })));
}

#[test]
fn test_graph_has_node_per_component_and_boundary() {
    let builder = DocumentBuilder::default();
    let model = builder.parse(SHOP).expect("Failed to parse document");
    let graph = builder.graph(&model);

    assert_eq!(graph.components().count(), 3);
    assert_eq!(graph.boundaries().count(), 1);
    assert_eq!(graph.edges.len(), 2);

    let backend = graph.node("backend").expect("boundary node");
    let members = ["api", "db"].map(|r| graph.node(r).expect("component node"));
    for member in members {
        assert!(backend.bounds().contains(member.center()));
        assert!(member.z_index > backend.z_index);
    }
}

#[test]
fn test_validate_reports_dangling_references() {
    let builder = DocumentBuilder::default();
    assert!(builder.validate(SHOP).expect("valid document").is_empty());

    let broken = SHOP.replace("implemented_in: [api]", "implemented_in: [gateway]");
    let warnings = builder.validate(&broken).expect("still parses");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message().contains("gateway"));
}

#[test]
fn test_regenerate_refs_resolve() {
    let builder = DocumentBuilder::default();
    let regeneration = builder.regenerate(SHOP).expect("Failed to regenerate");
    let model = builder.parse(&regeneration.yaml).expect("regenerated text parses");

    assert!(model.contains(EntityKind::Component, "orders-db"));
    assert!(model.contains(EntityKind::DataFlow, "api<->orders-db"));
    assert!(model.dangling_references().is_empty());

    let refs: Vec<_> = regeneration.renames.iter().map(|r| r.new.as_str()).collect();
    let mut unique = refs.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(refs.len(), unique.len());
}

#[test]
fn test_share_round_trip_through_link() {
    let builder = DocumentBuilder::default();
    let model = builder.parse(SHOP).expect("Failed to parse document");
    let metadata = RepositoryMetadata {
        domain: "github.com".to_string(),
        owner: "acme".to_string(),
        repository: "shop".to_string(),
        branch: "main".to_string(),
        path: "threats/shop.yaml".to_string(),
        sha: None,
    };

    let link = share::share_link("https://example.com/editor", &model, Some(&metadata))
        .expect("Failed to build link");
    let state = builder.decode_share(&link).expect("Failed to decode link");
    assert_eq!(state.model, model);
    assert_eq!(state.metadata, Some(metadata));

    let payload = builder.encode_share(&model, None).expect("Failed to encode");
    let state = builder.decode_share(&payload).expect("Failed to decode payload");
    assert_eq!(state.model, model);
    assert_eq!(state.metadata, None);
}

#[test]
fn test_decode_share_rejects_garbage() {
    let builder = DocumentBuilder::new(AppConfig::default());
    assert!(matches!(builder.decode_share(""), Err(ThreatmapError::Codec(_))));
    assert!(matches!(builder.decode_share("9abc"), Err(ThreatmapError::Codec(_))));
}

#[test]
fn test_open_editor_session() {
    let builder = DocumentBuilder::default();
    let mut editor = builder.open(SHOP).expect("Failed to open editor");
    let asset = editor.add_asset();
    assert_eq!(asset, "A02");
    assert!(editor.yaml().contains("  - ref: A01\n    name: Card data\n  - ref: A02\n"));
}
