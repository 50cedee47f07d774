//! Compact, URL-safe encoding of a whole threat model.
//!
//! A share payload is a one-character format tag followed by unpadded
//! URL-safe base64:
//!
//! | Tag | Payload bytes                               |
//! |-----|---------------------------------------------|
//! | `0` | compact short-key JSON                      |
//! | `1` | the same JSON, raw-DEFLATE compressed       |
//!
//! The encoder emits whichever form is shorter. Enum values travel as single
//! digits and absent optional fields are skipped, so decoding gives back a
//! model equal to the one encoded.
//!
//! # Examples
//!
//! ```
//! # use threatmap::share::{decode_model_from_url, encode_model_for_url};
//! # use threatmap_core::model::{Component, ThreatModel};
//! let mut model = ThreatModel::new("1.0", "Demo");
//! model.components.push(Component::new("api", "API"));
//!
//! let payload = encode_model_for_url(&model, None).unwrap();
//! let shared = decode_model_from_url(&payload).unwrap();
//! assert_eq!(shared.model, model);
//! assert!(shared.metadata.is_none());
//! ```

use std::io::{self, Read, Write};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use threatmap_core::model::{
    Asset, Boundary, Component, ComponentType, Control, DataFlow, Direction, Threat, ThreatModel,
};

use crate::config::ShareConfig;

/// Query parameter carrying the payload in a share link.
pub const SHARE_QUERY_PARAM: &str = "model";

const TAG_JSON: char = '0';
const TAG_DEFLATE: char = '1';

/// Where a shared document lives in version control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub domain: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// The result of decoding a share payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedState {
    pub model: ThreatModel,
    pub metadata: Option<RepositoryMetadata>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("share payload is empty")]
    Empty,

    #[error("unknown share format tag `{0}`")]
    UnknownFormat(char),

    #[error("share payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("share payload could not be decompressed: {0}")]
    Decompress(#[source] io::Error),

    #[error("share payload is malformed: {0}")]
    Payload(String),
}

/// Encodes `model` (and optional repository metadata) with default settings.
pub fn encode_model_for_url(
    model: &ThreatModel,
    metadata: Option<&RepositoryMetadata>,
) -> Result<String, CodecError> {
    encode_model_for_url_with(model, metadata, &ShareConfig::default())
}

/// Encodes `model`, compressing at the level given by `config`.
pub fn encode_model_for_url_with(
    model: &ThreatModel,
    metadata: Option<&RepositoryMetadata>,
    config: &ShareConfig,
) -> Result<String, CodecError> {
    ensure_finite_geometry(model)?;
    let wire = WireDocument::from_model(model, metadata);
    let json = serde_json::to_vec(&wire).map_err(|err| CodecError::Payload(err.to_string()))?;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(config.compression_level()));
    encoder
        .write_all(&json)
        .map_err(|err| CodecError::Payload(err.to_string()))?;
    let deflated = encoder
        .finish()
        .map_err(|err| CodecError::Payload(err.to_string()))?;

    let (tag, bytes) = if deflated.len() < json.len() {
        (TAG_DEFLATE, deflated.as_slice())
    } else {
        (TAG_JSON, json.as_slice())
    };

    let mut payload = String::with_capacity(1 + bytes.len() * 4 / 3 + 4);
    payload.push(tag);
    URL_SAFE_NO_PAD.encode_string(bytes, &mut payload);

    info!(
        json_bytes = json.len(),
        deflated_bytes = deflated.len(),
        payload_len = payload.len(),
        tag:% = tag;
        "Model encoded for sharing"
    );
    Ok(payload)
}

/// Decodes a payload produced by [`encode_model_for_url`].
///
/// # Errors
///
/// Each failure stage has its own [`CodecError`] variant: an empty input, an
/// unknown format tag, bad base64, a corrupt DEFLATE stream, or JSON that
/// does not describe a model.
pub fn decode_model_from_url(payload: &str) -> Result<SharedState, CodecError> {
    let payload = payload.trim();
    let mut chars = payload.chars();
    let tag = chars.next().ok_or(CodecError::Empty)?;
    let body = chars.as_str();

    let bytes = match tag {
        TAG_JSON => URL_SAFE_NO_PAD.decode(body)?,
        TAG_DEFLATE => {
            let compressed = URL_SAFE_NO_PAD.decode(body)?;
            let mut json = Vec::new();
            DeflateDecoder::new(compressed.as_slice())
                .read_to_end(&mut json)
                .map_err(CodecError::Decompress)?;
            json
        }
        other => return Err(CodecError::UnknownFormat(other)),
    };

    let wire: WireDocument =
        serde_json::from_slice(&bytes).map_err(|err| CodecError::Payload(err.to_string()))?;
    let state = wire.into_state()?;
    debug!(components = state.model.components.len(); "Share payload decoded");
    Ok(state)
}

/// Builds a link to `base_url` carrying the encoded model as `model=...`.
pub fn share_link(
    base_url: &str,
    model: &ThreatModel,
    metadata: Option<&RepositoryMetadata>,
) -> Result<String, CodecError> {
    let payload = encode_model_for_url(model, metadata)?;
    let separator = if base_url.contains('?') { '&' } else { '?' };
    Ok(format!("{base_url}{separator}{SHARE_QUERY_PARAM}={payload}"))
}

/// Extracts shared state from a link. Anything that fails to decode means
/// there is no shared state.
pub fn parse_share_link(url: &str) -> Option<SharedState> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    let payload = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(key, value)| (key == SHARE_QUERY_PARAM).then_some(value))?;

    match decode_model_from_url(payload) {
        Ok(state) => Some(state),
        Err(err) => {
            debug!(error:% = err; "Ignoring undecodable share link");
            None
        }
    }
}

// Short-key wire types. Field names are single letters and enums are digits;
// the mapping lives only here so the public model keeps readable names.

#[derive(Serialize, Deserialize)]
struct WireDocument {
    #[serde(rename = "m")]
    model: WireModel,
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    metadata: Option<WireMetadata>,
}

#[derive(Serialize, Deserialize)]
struct WireMetadata {
    #[serde(rename = "d")]
    domain: String,
    #[serde(rename = "o")]
    owner: String,
    #[serde(rename = "r")]
    repository: String,
    #[serde(rename = "b")]
    branch: String,
    #[serde(rename = "p")]
    path: String,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireModel {
    #[serde(rename = "v")]
    schema_version: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    participants: Option<Vec<String>>,
    #[serde(rename = "c", default)]
    components: Vec<WireComponent>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    assets: Option<Vec<WireAsset>>,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    data_flows: Option<Vec<WireDataFlow>>,
    #[serde(rename = "b", default, skip_serializing_if = "Option::is_none")]
    boundaries: Option<Vec<WireBoundary>>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    threats: Option<Vec<WireThreat>>,
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    controls: Option<Vec<WireControl>>,
}

fn is_zero(digit: &u8) -> bool {
    *digit == 0
}

#[derive(Serialize, Deserialize)]
struct WireComponent {
    #[serde(rename = "r")]
    r#ref: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "t", default, skip_serializing_if = "is_zero")]
    component_type: u8,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    assets: Option<Vec<String>>,
    #[serde(rename = "x", default, skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(rename = "y", default, skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct WireAsset {
    #[serde(rename = "r")]
    r#ref: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireDataFlow {
    #[serde(rename = "r")]
    r#ref: String,
    #[serde(rename = "s")]
    source: String,
    #[serde(rename = "t")]
    destination: String,
    #[serde(rename = "sp", default, skip_serializing_if = "Option::is_none")]
    source_point: Option<String>,
    #[serde(rename = "tp", default, skip_serializing_if = "Option::is_none")]
    destination_point: Option<String>,
    #[serde(rename = "b", default, skip_serializing_if = "is_zero")]
    direction: u8,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireBoundary {
    #[serde(rename = "r")]
    r#ref: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    components: Option<Vec<String>>,
    #[serde(rename = "x", default, skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(rename = "y", default, skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(rename = "w", default, skip_serializing_if = "Option::is_none")]
    width: Option<f64>,
    #[serde(rename = "h", default, skip_serializing_if = "Option::is_none")]
    height: Option<f64>,
}

/// Status fields shared by threats and controls.
#[derive(Serialize, Deserialize)]
struct WireStatus {
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "sl", default, skip_serializing_if = "Option::is_none")]
    status_link: Option<String>,
    #[serde(rename = "sn", default, skip_serializing_if = "Option::is_none")]
    status_note: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireThreat {
    #[serde(rename = "r")]
    r#ref: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    affected_components: Option<Vec<String>>,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    affected_data_flows: Option<Vec<String>>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    affected_assets: Option<Vec<String>>,
    #[serde(flatten)]
    status: WireStatus,
}

#[derive(Serialize, Deserialize)]
struct WireControl {
    #[serde(rename = "r")]
    r#ref: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    mitigates: Option<Vec<String>>,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    implemented_in: Option<Vec<String>>,
    #[serde(flatten)]
    status: WireStatus,
}

fn component_type_digit(component_type: ComponentType) -> u8 {
    match component_type {
        ComponentType::Internal => 0,
        ComponentType::External => 1,
        ComponentType::DataStore => 2,
    }
}

fn component_type_from_digit(digit: u8) -> Result<ComponentType, CodecError> {
    match digit {
        0 => Ok(ComponentType::Internal),
        1 => Ok(ComponentType::External),
        2 => Ok(ComponentType::DataStore),
        other => Err(CodecError::Payload(format!("unknown component type code {other}"))),
    }
}

fn direction_digit(direction: Direction) -> u8 {
    match direction {
        Direction::Unidirectional => 0,
        Direction::Bidirectional => 1,
    }
}

fn direction_from_digit(digit: u8) -> Result<Direction, CodecError> {
    match digit {
        0 => Ok(Direction::Unidirectional),
        1 => Ok(Direction::Bidirectional),
        other => Err(CodecError::Payload(format!("unknown direction code {other}"))),
    }
}

/// JSON has no NaN or infinity, so a non-finite coordinate cannot survive the
/// trip and is rejected instead of being dropped.
fn ensure_finite_geometry(model: &ThreatModel) -> Result<(), CodecError> {
    let components = model
        .components
        .iter()
        .flat_map(|c| [("x", c.x), ("y", c.y)].map(|(field, v)| (&c.r#ref, field, v)));
    let boundaries = model.boundaries().iter().flat_map(|b| {
        [("x", b.x), ("y", b.y), ("width", b.width), ("height", b.height)]
            .map(|(field, v)| (&b.r#ref, field, v))
    });

    match components
        .chain(boundaries)
        .find(|(_, _, value)| value.is_some_and(|v| !v.is_finite()))
    {
        Some((owner, field, value)) => Err(CodecError::Payload(format!(
            "`{field}` of `{owner}` is not a finite number ({})",
            value.unwrap_or_default()
        ))),
        None => Ok(()),
    }
}

fn map_list<T, U>(items: Option<&[T]>, f: impl Fn(&T) -> U) -> Option<Vec<U>> {
    items.map(|items| items.iter().map(f).collect())
}

fn try_map_list<T, U>(
    items: Option<Vec<T>>,
    f: impl Fn(T) -> Result<U, CodecError>,
) -> Result<Option<Vec<U>>, CodecError> {
    items.map(|items| items.into_iter().map(f).collect()).transpose()
}

impl WireDocument {
    fn from_model(model: &ThreatModel, metadata: Option<&RepositoryMetadata>) -> Self {
        let wire_model = WireModel {
            schema_version: model.schema_version.clone(),
            name: model.name.clone(),
            description: model.description.clone(),
            participants: model.participants.clone(),
            components: model
                .components
                .iter()
                .map(|c| WireComponent {
                    r#ref: c.r#ref.clone(),
                    name: c.name.clone(),
                    component_type: component_type_digit(c.component_type),
                    description: c.description.clone(),
                    assets: c.assets.clone(),
                    x: c.x,
                    y: c.y,
                })
                .collect(),
            assets: map_list(model.assets.as_deref(), |a| WireAsset {
                r#ref: a.r#ref.clone(),
                name: a.name.clone(),
                description: a.description.clone(),
            }),
            data_flows: map_list(model.data_flows.as_deref(), |f| WireDataFlow {
                r#ref: f.r#ref.clone(),
                source: f.source.clone(),
                destination: f.destination.clone(),
                source_point: f.source_point.clone(),
                destination_point: f.destination_point.clone(),
                direction: direction_digit(f.direction),
                label: f.label.clone(),
            }),
            boundaries: map_list(model.boundaries.as_deref(), |b| WireBoundary {
                r#ref: b.r#ref.clone(),
                name: b.name.clone(),
                description: b.description.clone(),
                components: b.components.clone(),
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            }),
            threats: map_list(model.threats.as_deref(), |t| WireThreat {
                r#ref: t.r#ref.clone(),
                name: t.name.clone(),
                description: t.description.clone(),
                affected_components: t.affected_components.clone(),
                affected_data_flows: t.affected_data_flows.clone(),
                affected_assets: t.affected_assets.clone(),
                status: WireStatus {
                    status: t.status.clone(),
                    status_link: t.status_link.clone(),
                    status_note: t.status_note.clone(),
                },
            }),
            controls: map_list(model.controls.as_deref(), |c| WireControl {
                r#ref: c.r#ref.clone(),
                name: c.name.clone(),
                description: c.description.clone(),
                mitigates: c.mitigates.clone(),
                implemented_in: c.implemented_in.clone(),
                status: WireStatus {
                    status: c.status.clone(),
                    status_link: c.status_link.clone(),
                    status_note: c.status_note.clone(),
                },
            }),
        };

        Self {
            model: wire_model,
            metadata: metadata.map(|m| WireMetadata {
                domain: m.domain.clone(),
                owner: m.owner.clone(),
                repository: m.repository.clone(),
                branch: m.branch.clone(),
                path: m.path.clone(),
                sha: m.sha.clone(),
            }),
        }
    }

    fn into_state(self) -> Result<SharedState, CodecError> {
        let wire = self.model;
        let components = wire
            .components
            .into_iter()
            .map(|c| {
                Ok(Component {
                    r#ref: c.r#ref,
                    name: c.name,
                    component_type: component_type_from_digit(c.component_type)?,
                    description: c.description,
                    assets: c.assets,
                    x: c.x,
                    y: c.y,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        let model = ThreatModel {
            schema_version: wire.schema_version,
            name: wire.name,
            description: wire.description,
            participants: wire.participants,
            components,
            assets: try_map_list(wire.assets, |a| {
                Ok(Asset {
                    r#ref: a.r#ref,
                    name: a.name,
                    description: a.description,
                })
            })?,
            data_flows: try_map_list(wire.data_flows, |f| {
                Ok(DataFlow {
                    r#ref: f.r#ref,
                    source: f.source,
                    destination: f.destination,
                    source_point: f.source_point,
                    destination_point: f.destination_point,
                    direction: direction_from_digit(f.direction)?,
                    label: f.label,
                })
            })?,
            boundaries: try_map_list(wire.boundaries, |b| {
                Ok(Boundary {
                    r#ref: b.r#ref,
                    name: b.name,
                    description: b.description,
                    components: b.components,
                    x: b.x,
                    y: b.y,
                    width: b.width,
                    height: b.height,
                })
            })?,
            threats: try_map_list(wire.threats, |t| {
                Ok(Threat {
                    r#ref: t.r#ref,
                    name: t.name,
                    description: t.description,
                    affected_components: t.affected_components,
                    affected_data_flows: t.affected_data_flows,
                    affected_assets: t.affected_assets,
                    status: t.status.status,
                    status_link: t.status.status_link,
                    status_note: t.status.status_note,
                })
            })?,
            controls: try_map_list(wire.controls, |c| {
                Ok(Control {
                    r#ref: c.r#ref,
                    name: c.name,
                    description: c.description,
                    mitigates: c.mitigates,
                    implemented_in: c.implemented_in,
                    status: c.status.status,
                    status_link: c.status.status_link,
                    status_note: c.status.status_note,
                })
            })?,
        };

        let metadata = self.metadata.map(|m| RepositoryMetadata {
            domain: m.domain,
            owner: m.owner,
            repository: m.repository,
            branch: m.branch,
            path: m.path,
            sha: m.sha,
        });

        Ok(SharedState { model, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> ThreatModel {
        let mut model = ThreatModel::new("1.0", "Payments");
        let mut api = Component::new("api", "API");
        api.x = Some(120.5);
        api.y = Some(0.1 + 0.2);
        api.assets = Some(vec!["A01".to_string()]);
        let mut db = Component::new("db", "Ledger DB");
        db.component_type = ComponentType::DataStore;
        model.components = vec![api, db];
        model.assets = Some(vec![Asset {
            r#ref: "A01".to_string(),
            name: "Card data".to_string(),
            description: None,
        }]);
        model.data_flows = Some(vec![DataFlow {
            r#ref: "api<->db".to_string(),
            source: "api".to_string(),
            destination: "db".to_string(),
            source_point: Some("right".to_string()),
            destination_point: None,
            direction: Direction::Bidirectional,
            label: Some("DF1".to_string()),
        }]);
        model.threats = Some(vec![]);
        model
    }

    fn metadata() -> RepositoryMetadata {
        RepositoryMetadata {
            domain: "github.com".to_string(),
            owner: "acme".to_string(),
            repository: "models".to_string(),
            branch: "main".to_string(),
            path: "payments.yaml".to_string(),
            sha: None,
        }
    }

    #[test]
    fn test_round_trip_preserves_absence_and_precision() {
        let model = sample_model();
        let payload = encode_model_for_url(&model, Some(&metadata())).unwrap();
        let shared = decode_model_from_url(&payload).unwrap();

        assert_eq!(shared.model, model);
        assert_eq!(shared.model.components[0].y, Some(0.1 + 0.2));
        assert_eq!(shared.model.threats, Some(vec![]));
        assert!(shared.model.controls.is_none());
        assert_eq!(shared.metadata, Some(metadata()));
    }

    #[test]
    fn test_payload_is_url_safe() {
        let payload = encode_model_for_url(&sample_model(), None).unwrap();
        assert!(
            payload
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_small_model_is_smaller_than_json() {
        let model = sample_model();
        let json = serde_json::to_string(&model).unwrap();
        let payload = encode_model_for_url(&model, None).unwrap();
        assert!((payload.len() as f64) < json.len() as f64 * 0.8);
    }

    #[test]
    fn test_errors_are_distinguishable() {
        assert!(matches!(decode_model_from_url(""), Err(CodecError::Empty)));
        assert!(matches!(decode_model_from_url("9abc"), Err(CodecError::UnknownFormat('9'))));
        assert!(matches!(decode_model_from_url("0***"), Err(CodecError::Base64(_))));
        assert!(matches!(
            decode_model_from_url(&format!("1{}", URL_SAFE_NO_PAD.encode(b"not deflate at all"))),
            Err(CodecError::Decompress(_)) | Err(CodecError::Payload(_))
        ));
        assert!(matches!(
            decode_model_from_url(&format!("0{}", URL_SAFE_NO_PAD.encode(b"{\"x\":1}"))),
            Err(CodecError::Payload(_))
        ));
    }

    #[test]
    fn test_non_finite_coordinates_are_rejected() {
        let model = threatmap_yaml::parse(
            "schema_version: '1.0'\nname: X\ncomponents:\n  - ref: a\n    name: A\n    x: .nan\n    y: .inf\n",
        )
        .unwrap();
        assert!(model.components[0].x.is_some_and(f64::is_nan));

        let err = encode_model_for_url(&model, None).unwrap_err();
        assert!(matches!(&err, CodecError::Payload(msg) if msg.contains("`x` of `a`")));

        let mut model = sample_model();
        model.boundaries = Some(vec![Boundary {
            r#ref: "zone".to_string(),
            name: "Zone".to_string(),
            description: None,
            components: None,
            x: Some(0.0),
            y: Some(0.0),
            width: Some(f64::INFINITY),
            height: Some(10.0),
        }]);
        assert!(matches!(
            encode_model_for_url(&model, None),
            Err(CodecError::Payload(msg)) if msg.contains("`width` of `zone`")
        ));
    }

    #[test]
    fn test_unknown_enum_digit_is_payload_error() {
        let json = br#"{"m":{"v":"1.0","n":"X","c":[{"r":"a","n":"A","t":7}]}}"#;
        let payload = format!("0{}", URL_SAFE_NO_PAD.encode(json));
        assert!(matches!(decode_model_from_url(&payload), Err(CodecError::Payload(_))));
    }

    #[test]
    fn test_share_link_round_trip() {
        let model = sample_model();
        let link = share_link("https://example.com/editor", &model, Some(&metadata())).unwrap();
        assert!(link.starts_with("https://example.com/editor?model="));

        let shared = parse_share_link(&link).unwrap();
        assert_eq!(shared.model, model);

        let with_query = share_link("https://example.com/?tab=graph", &model, None).unwrap();
        assert!(with_query.contains("?tab=graph&model="));
        assert!(parse_share_link(&with_query).is_some());
    }

    #[test]
    fn test_parse_share_link_failures_mean_no_state() {
        assert!(parse_share_link("https://example.com/editor").is_none());
        assert!(parse_share_link("https://example.com/editor?model=").is_none());
        assert!(parse_share_link("https://example.com/editor?model=1@@@").is_none());
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        // =====================================================================
        // Strategies
        // =====================================================================

        fn coordinate_strategy() -> impl Strategy<Value = Option<f64>> {
            prop::option::of(-1.0e6..1.0e6f64)
        }

        fn component_type_strategy() -> impl Strategy<Value = ComponentType> {
            prop_oneof![
                Just(ComponentType::Internal),
                Just(ComponentType::External),
                Just(ComponentType::DataStore),
            ]
        }

        fn component_strategy() -> impl Strategy<Value = Component> {
            (
                "[a-z][a-z0-9-]{0,12}",
                "\\PC{0,20}",
                component_type_strategy(),
                coordinate_strategy(),
                coordinate_strategy(),
                prop::option::of("\\PC{0,30}"),
            )
                .prop_map(|(r, name, component_type, x, y, description)| {
                    let mut component = Component::new(r, name);
                    component.component_type = component_type;
                    component.x = x;
                    component.y = y;
                    component.description = description;
                    component
                })
        }

        fn model_strategy() -> impl Strategy<Value = ThreatModel> {
            (
                "\\PC{1,20}",
                prop::collection::vec(component_strategy(), 0..8),
                any::<bool>(),
                prop::option::of("[A-Z]{1,4}"),
            )
                .prop_map(|(name, components, bidirectional, label)| {
                    let mut model = ThreatModel::new("1.0", name);
                    let flows: Vec<DataFlow> = components
                        .windows(2)
                        .map(|pair| {
                            let direction = if bidirectional {
                                Direction::Bidirectional
                            } else {
                                Direction::Unidirectional
                            };
                            DataFlow {
                                r#ref: format!(
                                    "{}{}{}",
                                    pair[0].r#ref,
                                    direction.arrow(),
                                    pair[1].r#ref
                                ),
                                source: pair[0].r#ref.clone(),
                                destination: pair[1].r#ref.clone(),
                                source_point: None,
                                destination_point: Some("left".to_string()),
                                direction,
                                label: label.clone(),
                            }
                        })
                        .collect();
                    model.components = components;
                    if !flows.is_empty() {
                        model.data_flows = Some(flows);
                    }
                    model
                })
        }

        // =====================================================================
        // Property Test Functions
        // =====================================================================

        fn check_round_trip(model: &ThreatModel) -> Result<(), TestCaseError> {
            let payload = encode_model_for_url(model, Some(&metadata()))
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert!(
                payload
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            );

            let shared = decode_model_from_url(&payload)
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert_eq!(&shared.model, model);
            prop_assert_eq!(shared.metadata, Some(metadata()));
            Ok(())
        }

        // =====================================================================
        // Proptest Wrappers
        // =====================================================================

        proptest! {
            #[test]
            fn codec_round_trip(model in model_strategy()) {
                check_round_trip(&model)?;
            }
        }
    }
}
