//! Chained variable-binding store with nested lexical scopes.

use std::collections::HashMap;

/// A stack of binding frames. Lookup searches the innermost frame first and
/// walks outward; a name bound in an inner frame shadows the same name in
/// an outer frame for the lifetime of that frame. Frames below the active
/// one are never mutated by the inner frame, except through [`assign`],
/// which updates the nearest existing binding in place.
///
/// [`assign`]: ScopedEnv::assign
#[derive(Clone, Debug)]
pub struct ScopedEnv<V> {
    frames: Vec<HashMap<String, V>>,
}

impl<V> ScopedEnv<V> {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    /// Enter a nested lexical scope.
    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Leave the innermost scope, dropping its bindings.
    pub fn pop_frame(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the outermost frame");
        self.frames.pop();
    }

    /// First hit walking outward from the innermost frame.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind in the innermost frame, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, value: V) {
        self.frames
            .last_mut()
            .expect("at least one frame")
            .insert(name.into(), value);
    }

    /// Update the nearest existing binding, or define in the innermost
    /// frame when the name is new. This is what lets a loop body update an
    /// accumulator bound outside the loop while its own temporaries stay
    /// local to the iteration.
    pub fn assign(&mut self, name: &str, value: V) {
        if let Some(slot) = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
        {
            *slot = value;
            return;
        }
        self.define(name, value);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl<V> Default for ScopedEnv<V> {
    fn default() -> Self {
        Self::new()
    }
}
