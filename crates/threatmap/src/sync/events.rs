use threatmap_core::geometry::{Bounds, Point};

use crate::graph::TARGET_HANDLE_PREFIX;

/// A connection gesture as reported by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: String,
    pub target: String,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(
        mut self,
        source_handle: Option<&str>,
        target_handle: Option<&str>,
    ) -> Self {
        self.source_handle = source_handle.map(str::to_string);
        self.target_handle = target_handle.map(str::to_string);
        self
    }

    /// Undoes the inversion of drags that start on a target anchor.
    ///
    /// When the gesture begins on a `target-` handle the rendering layer
    /// reports the endpoints swapped. The result has the real source first
    /// and both handles without the prefix, ready to store as
    /// `source_point`/`destination_point`.
    pub fn normalized(self) -> NormalizedConnection {
        let inverted = self
            .source_handle
            .as_deref()
            .is_some_and(|h| h.starts_with(TARGET_HANDLE_PREFIX));

        let (source, destination, source_handle, destination_handle) = if inverted {
            (self.target, self.source, self.target_handle, self.source_handle)
        } else {
            (self.source, self.target, self.source_handle, self.target_handle)
        };

        let strip = |handle: Option<String>| {
            handle.map(|h| {
                h.strip_prefix(TARGET_HANDLE_PREFIX)
                    .map(str::to_string)
                    .unwrap_or(h)
            })
        };

        NormalizedConnection {
            source,
            destination,
            source_point: strip(source_handle),
            destination_point: strip(destination_handle),
        }
    }
}

/// A connection with endpoints in data-flow order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedConnection {
    pub source: String,
    pub destination: String,
    pub source_point: Option<String>,
    pub destination_point: Option<String>,
}

impl NormalizedConnection {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.destination
    }
}

/// Events emitted by the rendering layer.
///
/// Positions are top-left corners in diagram coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    DragStart { id: String },
    Drag { id: String, position: Point },
    DragStop { id: String, position: Point },
    /// One arrow-key step.
    Nudge { id: String, dx: f64, dy: f64 },
    /// The arrow key was released.
    NudgeEnd,
    ResizeStart { id: String },
    Resize { id: String, bounds: Bounds },
    ResizeEnd { id: String, bounds: Bounds },
    Connect(Connection),
    Reconnect { edge: String, connection: Connection },
    Delete { nodes: Vec<String>, edges: Vec<String> },
    Select { ids: Vec<String> },
}
