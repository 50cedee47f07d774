use std::{collections::VecDeque, rc::Rc};

use log::trace;

use threatmap_core::model::ThreatModel;

/// The editor state restored by undo and redo.
///
/// Cloning is cheap: the model and text are shared, and the editor only
/// copies the model when it mutates a shared one.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub model: Rc<ThreatModel>,
    pub yaml: Rc<str>,
    pub selection: Vec<String>,
}

/// Bounded undo and redo stacks of [`Snapshot`]s.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    max_depth: usize,
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Records the state before a mutation and forgets the redo branch.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.redo.clear();
        self.push_undo(snapshot);
        trace!(depth = self.undo.len(); "Snapshot recorded");
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
    }

    /// Steps back, parking `current` on the redo stack.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Steps forward again, parking `current` on the undo stack.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo.pop()?;
        self.push_undo(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str) -> Snapshot {
        Snapshot {
            model: Rc::new(ThreatModel::new("1.0", name)),
            yaml: Rc::from(name),
            selection: Vec::new(),
        }
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut history = History::new(10);
        history.push(snapshot("a"));
        history.push(snapshot("b"));

        let back = history.undo(snapshot("c")).unwrap();
        assert_eq!(&*back.yaml, "b");
        assert!(history.can_redo());

        let forward = history.redo(back).unwrap();
        assert_eq!(&*forward.yaml, "c");
        assert!(!history.can_redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = History::new(10);
        history.push(snapshot("a"));
        history.undo(snapshot("b"));
        assert!(history.can_redo());

        history.push(snapshot("a"));
        assert!(!history.can_redo());
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut history = History::new(3);
        for name in ["1", "2", "3", "4", "5"] {
            history.push(snapshot(name));
        }
        assert_eq!(history.undo_depth(), 3);

        let mut current = snapshot("now");
        let mut seen = Vec::new();
        while let Some(previous) = history.undo(current) {
            seen.push(previous.yaml.to_string());
            current = previous;
        }
        assert_eq!(seen, ["5", "4", "3"]);
    }

    #[test]
    fn test_redo_respects_depth() {
        let mut history = History::new(2);
        for name in ["1", "2", "3"] {
            history.push(snapshot(name));
        }

        let mut current = snapshot("now");
        for _ in 0..5 {
            current = history.undo(current).unwrap();
            current = history.redo(current).unwrap();
            assert!(history.undo_depth() <= 2);
        }
        assert_eq!(&*current.yaml, "now");
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_empty_history() {
        let mut history = History::new(3);
        assert!(history.undo(snapshot("x")).is_none());
        assert!(history.redo(snapshot("x")).is_none());
    }
}
