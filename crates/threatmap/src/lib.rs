//! Threatmap - An editor core for YAML threat models and their diagrams.
//!
//! A threat model is kept in three representations at once: the structured
//! [`ThreatModel`], its hand-editable YAML source, and a positioned
//! [`graph::Graph`] for rendering. This crate derives the graph, keeps all
//! three in step while the user edits ([`sync::Editor`]), and packs models
//! into shareable URLs ([`share`]).

pub mod config;
pub mod graph;
pub mod share;
pub mod sync;

mod error;

pub use threatmap_core::{geometry, identifier, model};
pub use threatmap_yaml::{Regeneration, error::Diagnostic};

pub use error::ThreatmapError;

use log::{debug, info, trace};

use config::AppConfig;
use graph::Graph;
use model::ThreatModel;
use share::{RepositoryMetadata, SharedState};
use sync::Editor;

/// Entry point for one-shot operations on threat-model documents.
///
/// # Examples
///
/// ```
/// use threatmap::{DocumentBuilder, config::AppConfig};
///
/// let source = "schema_version: '1.0'\nname: Demo\ncomponents:\n  - ref: api\n    name: API\n";
/// let builder = DocumentBuilder::new(AppConfig::default());
///
/// let model = builder.parse(source).expect("Failed to parse");
/// let graph = builder.graph(&model);
/// assert_eq!(graph.nodes.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    config: AppConfig,
}

impl DocumentBuilder {
    /// Create a new builder with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Parse YAML source into a threat model.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] with diagnostics pointing into
    /// `source`.
    pub fn parse(&self, source: &str) -> Result<ThreatModel, ThreatmapError> {
        info!("Parsing threat model");
        let model = threatmap_yaml::parse(source)
            .map_err(|err| ThreatmapError::new_parse_error(err, source))?;
        debug!(components = model.components.len(); "Threat model parsed successfully");
        trace!(model:?; "Parsed model");
        Ok(model)
    }

    /// Parse `source` and collect the warnings a valid document can still
    /// carry: duplicate refs and dangling references.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] when the document does not parse.
    pub fn validate(&self, source: &str) -> Result<Vec<Diagnostic>, ThreatmapError> {
        let model = self.parse(source)?;
        let diagnostics = threatmap_yaml::validate(source, &model);
        info!(warnings = diagnostics.len(); "Validation finished");
        Ok(diagnostics)
    }

    /// Derive the diagram graph for `model`.
    pub fn graph(&self, model: &ThreatModel) -> Graph {
        graph::transform_threat_model(model, self.config.layout())
    }

    /// Rebuild every ref in `source` from the entity names.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] when the document does not parse.
    pub fn regenerate(&self, source: &str) -> Result<Regeneration, ThreatmapError> {
        threatmap_yaml::regenerate_all_refs(source)
            .map_err(|err| ThreatmapError::new_parse_error(err, source))
    }

    /// Encode `model` into a URL-safe share payload.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Codec`] if the model cannot be serialized.
    pub fn encode_share(
        &self,
        model: &ThreatModel,
        metadata: Option<&RepositoryMetadata>,
    ) -> Result<String, ThreatmapError> {
        Ok(share::encode_model_for_url_with(
            model,
            metadata,
            self.config.share(),
        )?)
    }

    /// Decode a share payload or a full link carrying one.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Codec`] describing the failing stage.
    pub fn decode_share(&self, input: &str) -> Result<SharedState, ThreatmapError> {
        let payload = input
            .split_once('?')
            .and_then(|(_, query)| {
                query
                    .split(['&', '#'])
                    .filter_map(|pair| pair.split_once('='))
                    .find_map(|(key, value)| (key == share::SHARE_QUERY_PARAM).then_some(value))
            })
            .unwrap_or(input);
        Ok(share::decode_model_from_url(payload)?)
    }

    /// Open `source` in an interactive editing session.
    ///
    /// # Errors
    ///
    /// Returns [`ThreatmapError::Parse`] when the document does not parse.
    pub fn open(&self, source: &str) -> Result<Editor, ThreatmapError> {
        Editor::new(source, self.config.clone())
    }
}
