//! Undoable parameter edits.
//!
//! [`AutomationHistory`] sits on the control thread between editors and
//! [`ParamBinding`]s. Every edit goes through [`AutomationHistory::set`], which
//! writes the atomic value and records the previous one. Edits made between
//! [`begin_gesture`](AutomationHistory::begin_gesture) and
//! [`end_gesture`](AutomationHistory::end_gesture) (a knob drag, say) collapse
//! into one undo step.
//!
//! Edits are tied to the instance that owned the window when they were made.
//! Once that instance is gone and its window reclaimed, undo and redo skip
//! them, and a step with nothing left to apply is discarded.

use crate::param::ParamBinding;
use std::collections::VecDeque;

/// Undo steps kept before the oldest are discarded.
pub const DEFAULT_HISTORY_DEPTH: usize = 128;

#[derive(Debug, Clone)]
struct Edit {
    binding: ParamBinding,
    param: usize,
    before: f32,
    after: f32,
}

/// Undo/redo history for parameter edits.
#[derive(Debug)]
pub struct AutomationHistory {
    undo: VecDeque<Vec<Edit>>,
    redo: Vec<Vec<Edit>>,
    gesture: Option<Vec<Edit>>,
    depth: usize,
}

impl Default for AutomationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl AutomationHistory {
    /// Creates a history that keeps at most `depth` undo steps.
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            gesture: None,
            depth: depth.max(1),
        }
    }

    /// Opens a gesture. Nested calls are ignored.
    pub fn begin_gesture(&mut self) {
        if self.gesture.is_none() {
            self.gesture = Some(Vec::new());
        }
    }

    /// Closes the open gesture and commits it as one undo step.
    pub fn end_gesture(&mut self) {
        if let Some(edits) = self.gesture.take()
            && !edits.is_empty()
        {
            self.commit(edits);
        }
    }

    /// Returns `true` while a gesture is open.
    pub fn in_gesture(&self) -> bool {
        self.gesture.is_some()
    }

    /// Writes `value` through `binding` and records the edit.
    ///
    /// Returns the stored (clamped) value, or `None` for an invalid index.
    pub fn set(&mut self, binding: &ParamBinding, param: usize, value: f32) -> Option<f32> {
        let before = binding.parameter(param)?.get();
        let after = binding.set(param, value)?;
        if before == after {
            return Some(after);
        }
        let edit = Edit {
            binding: binding.clone(),
            param,
            before,
            after,
        };
        match &mut self.gesture {
            Some(edits) => {
                // Consecutive writes to one parameter keep the first `before`.
                if let Some(last) = edits.last_mut()
                    && last.param == param
                    && last.binding.same_window(binding)
                {
                    last.after = after;
                } else {
                    edits.push(edit);
                }
            }
            None => self.commit(vec![edit]),
        }
        Some(after)
    }

    fn commit(&mut self, edits: Vec<Edit>) {
        self.redo.clear();
        self.undo.push_back(edits);
        if self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    /// Reverts the most recent step. Returns `false` if there was none.
    ///
    /// An open gesture is closed first. Steps whose instances have all been
    /// destroyed are dropped on the way.
    pub fn undo(&mut self) -> bool {
        self.end_gesture();
        while let Some(edits) = self.undo.pop_back() {
            let Some(edits) = live(edits) else {
                continue;
            };
            for edit in edits.iter().rev() {
                edit.binding.set(edit.param, edit.before);
            }
            self.redo.push(edits);
            return true;
        }
        false
    }

    /// Re-applies the most recently undone step.
    pub fn redo(&mut self) -> bool {
        while let Some(edits) = self.redo.pop() {
            let Some(edits) = live(edits) else {
                continue;
            };
            for edit in &edits {
                edit.binding.set(edit.param, edit.after);
            }
            self.undo.push_back(edits);
            return true;
        }
        false
    }

    /// Number of available undo steps.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Number of available redo steps.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Drops every recorded step, e.g. after loading a new rack state.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.gesture = None;
    }
}

/// Keeps the edits whose window still belongs to the instance that made
/// them. `None` if none do.
fn live(mut edits: Vec<Edit>) -> Option<Vec<Edit>> {
    edits.retain(|edit| edit.binding.is_current());
    (!edits.is_empty()).then_some(edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParameterSet;
    use crate::param_info::ParamDescriptor;

    fn binding() -> ParamBinding {
        let set = ParameterSet::new(
            &[
                ParamDescriptor::gain_db("Gain", "gain", -24.0, 24.0, 0.0),
                ParamDescriptor::percent("Mix", "mix", 50.0),
            ],
            1,
        );
        set.bind(0).unwrap()
    }

    #[test]
    fn undo_redo_single_edit() {
        let b = binding();
        let mut history = AutomationHistory::default();
        history.set(&b, 0, 6.0);
        assert!(history.undo());
        assert_eq!(b.get(0), 0.0);
        assert!(history.redo());
        assert_eq!(b.get(0), 6.0);
        assert!(!history.redo());
    }

    #[test]
    fn gesture_collapses_to_one_step() {
        let b = binding();
        let mut history = AutomationHistory::default();
        history.begin_gesture();
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.set(&b, 0, v);
        }
        history.set(&b, 1, 80.0);
        history.end_gesture();
        assert_eq!(history.undo_len(), 1);
        history.undo();
        assert_eq!(b.get(0), 0.0);
        assert_eq!(b.get(1), 50.0);
    }

    #[test]
    fn new_edit_clears_redo() {
        let b = binding();
        let mut history = AutomationHistory::default();
        history.set(&b, 0, 1.0);
        history.undo();
        assert_eq!(history.redo_len(), 1);
        history.set(&b, 0, 2.0);
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn depth_is_bounded() {
        let b = binding();
        let mut history = AutomationHistory::new(3);
        for v in 1..=10 {
            history.set(&b, 0, v as f32);
        }
        assert_eq!(history.undo_len(), 3);
        while history.undo() {}
        assert_eq!(b.get(0), 7.0, "the oldest steps were dropped");
    }

    #[test]
    fn edits_on_a_reclaimed_window_are_skipped() {
        let set = ParameterSet::new(
            &[ParamDescriptor::gain_db("Gain", "gain", -24.0, 24.0, 0.0)],
            2,
        );
        let kept = set.claim(0).unwrap();
        let old = set.claim(1).unwrap();
        let mut history = AutomationHistory::default();
        history.set(&kept, 0, 3.0);
        history.set(&old, 0, -12.0);

        // Index 1 goes to a new instance, which starts from its own value.
        let new = set.claim(1).unwrap();
        new.reset();
        new.set(0, 6.0);

        assert!(history.undo(), "falls through to the older live step");
        assert_eq!(new.get(0), 6.0);
        assert_eq!(kept.get(0), 0.0);
        assert!(!history.undo());
        assert_eq!(history.undo_len(), 0);

        assert!(history.redo());
        assert_eq!(kept.get(0), 3.0);
        assert_eq!(new.get(0), 6.0);
    }

    #[test]
    fn gesture_keeps_only_live_edits() {
        let set = ParameterSet::new(
            &[ParamDescriptor::gain_db("Gain", "gain", -24.0, 24.0, 0.0)],
            2,
        );
        let a = set.claim(0).unwrap();
        let b = set.claim(1).unwrap();
        let mut history = AutomationHistory::default();
        history.begin_gesture();
        history.set(&a, 0, 1.0);
        history.set(&b, 0, 2.0);
        history.end_gesture();

        let replacement = set.claim(1).unwrap();
        replacement.set(0, 9.0);
        assert!(history.undo());
        assert_eq!(a.get(0), 0.0);
        assert_eq!(replacement.get(0), 9.0);
    }

    #[test]
    fn unchanged_value_is_not_recorded() {
        let b = binding();
        let mut history = AutomationHistory::default();
        history.set(&b, 1, 50.0);
        assert_eq!(history.undo_len(), 0);
    }
}
