//! Keeping the model, the YAML text and the graph in step.
//!
//! The [`Editor`] owns all three representations. Every mutation snapshots
//! the current state into the undo [`History`], changes
//! the model, patches the YAML text with line-local edits, and then patches
//! or re-derives the graph. Interactive gestures (drag, arrow-key nudge,
//! resize) move the graph immediately and commit to the model once the
//! gesture settles.
//!
//! Time never comes from a clock: callers pass an [`Instant`](std::time::Instant)
//! with each event and call [`Editor::tick`] to let a nudge burst settle.

mod controller;
mod debounce;
mod events;
mod history;

pub use controller::{Editor, StatusField};
pub use debounce::Debounce;
pub use events::{Connection, GraphEvent, NormalizedConnection};
pub use history::{History, Snapshot};
