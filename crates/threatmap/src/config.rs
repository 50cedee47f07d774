//! Configuration types for the Threatmap editor core.
//!
//! This module provides the configuration structures that control diagram
//! geometry, undo history, interaction timing and the share codec. All types
//! implement [`serde::Deserialize`] so the CLI can load them from TOML, and
//! every field falls back to its default when omitted.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining all sections.
//! - [`LayoutConfig`] - Node footprints, boundary padding and fallback placement.
//! - [`HistoryConfig`] - Undo/redo depth.
//! - [`InteractionConfig`] - How long a keyboard nudge burst takes to settle.
//! - [`ShareConfig`] - Compression level of share links.
//!
//! # Example
//!
//! ```
//! # use threatmap::config::AppConfig;
//! let config = AppConfig::default();
//! assert_eq!(config.layout().component_size().width(), 140.0);
//! assert_eq!(config.history().max_depth(), 100);
//! ```

use std::time::Duration;

use serde::Deserialize;

use threatmap_core::geometry::{Point, Size};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Diagram geometry section.
    #[serde(default)]
    layout: LayoutConfig,

    /// Undo history section.
    #[serde(default)]
    history: HistoryConfig,

    /// Interaction timing section.
    #[serde(default)]
    interaction: InteractionConfig,

    /// Share link section.
    #[serde(default)]
    share: ShareConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its sections.
    pub fn new(
        layout: LayoutConfig,
        history: HistoryConfig,
        interaction: InteractionConfig,
        share: ShareConfig,
    ) -> Self {
        Self {
            layout,
            history,
            interaction,
            share,
        }
    }

    /// Returns the layout configuration.
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Returns the history configuration.
    pub fn history(&self) -> &HistoryConfig {
        &self.history
    }

    /// Returns the interaction configuration.
    pub fn interaction(&self) -> &InteractionConfig {
        &self.interaction
    }

    /// Returns the share configuration.
    pub fn share(&self) -> &ShareConfig {
        &self.share
    }
}

/// Geometry used when turning a model into a graph.
///
/// Components without stored coordinates cascade diagonally from
/// `default_origin` in steps of `cascade_step`. A boundary without explicit
/// geometry wraps its components' footprints with `boundary_padding`, or
/// falls back to the default boundary size at `default_origin`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    component_width: f64,
    component_height: f64,
    boundary_padding: f64,
    default_boundary_width: f64,
    default_boundary_height: f64,
    default_origin: f64,
    cascade_step: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            component_width: 140.0,
            component_height: 80.0,
            boundary_padding: 40.0,
            default_boundary_width: 400.0,
            default_boundary_height: 300.0,
            default_origin: 100.0,
            cascade_step: 150.0,
        }
    }
}

impl LayoutConfig {
    /// Footprint of every component node.
    pub fn component_size(&self) -> Size {
        Size::new(self.component_width, self.component_height)
    }

    /// Padding added on every side of a derived boundary box.
    pub fn boundary_padding(&self) -> f64 {
        self.boundary_padding
    }

    /// Size of a boundary with neither geometry nor resolvable components.
    pub fn default_boundary_size(&self) -> Size {
        Size::new(self.default_boundary_width, self.default_boundary_height)
    }

    /// Top-left corner of a fallback boundary, and of the first cascaded component.
    pub fn default_origin(&self) -> Point {
        Point::new(self.default_origin, self.default_origin)
    }

    /// Position of the `index`-th component when it has no stored coordinates.
    pub fn cascade_position(&self, index: usize) -> Point {
        let offset = self.cascade_step * index as f64;
        Point::new(self.default_origin + offset, self.default_origin + offset)
    }
}

/// Undo/redo history settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of undo snapshots kept; the oldest are dropped first.
    max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

impl HistoryConfig {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Returns the maximum number of undo snapshots.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

/// Timing of interactive edits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Idle time after the last key-up before a nudge burst is committed.
    nudge_settle_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            nudge_settle_ms: 400,
        }
    }
}

impl InteractionConfig {
    pub fn new(nudge_settle: Duration) -> Self {
        Self {
            nudge_settle_ms: u64::try_from(nudge_settle.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns the nudge settle window.
    pub fn nudge_settle(&self) -> Duration {
        Duration::from_millis(self.nudge_settle_ms)
    }
}

/// Share link settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// DEFLATE level, 0 (store) to 9 (best).
    compression_level: u32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            compression_level: 9,
        }
    }
}

impl ShareConfig {
    pub fn new(compression_level: u32) -> Self {
        Self { compression_level }
    }

    /// Returns the compression level, clamped to the valid range.
    pub fn compression_level(&self) -> u32 {
        self.compression_level.min(9)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_cascade_position() {
        let layout = LayoutConfig::default();
        let third = layout.cascade_position(2);
        assert_approx_eq!(f64, third.x(), 400.0);
        assert_approx_eq!(f64, third.y(), 400.0);
        assert_eq!(layout.cascade_position(0), layout.default_origin());
    }

    #[test]
    fn test_share_level_is_clamped() {
        assert_eq!(ShareConfig::new(42).compression_level(), 9);
        assert_eq!(ShareConfig::new(3).compression_level(), 3);
    }

    #[test]
    fn test_interaction_round_trips_duration() {
        let config = InteractionConfig::new(Duration::from_millis(250));
        assert_eq!(config.nudge_settle(), Duration::from_millis(250));
    }
}
