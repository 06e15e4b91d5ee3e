//! Strategy combinators for term rewriting.
//!
//! A [`Strategy`] is a partial transformation: `None` means "no match" and
//! is the only no-match channel, so a rule may rewrite a node to any term
//! value. Plain closures `Fn(&T) -> Option<T>` are strategies; the
//! combinators compose them into traversal orders and iteration policies.

use crate::term::Term;

/// A partial rewrite: `Some(replacement)` or `None` for "no match".
pub trait Strategy<T: Term> {
    fn apply(&self, term: &T) -> Option<T>;
}

impl<T: Term, F> Strategy<T> for F
where
    F: Fn(&T) -> Option<T>,
{
    fn apply(&self, term: &T) -> Option<T> {
        self(term)
    }
}

/// Total wrapper: applies the inner strategy once at the root, returning the
/// original term unchanged when it reports no match. Never returns "absent".
pub struct Rewrite<S>(pub S);

impl<S> Rewrite<S> {
    pub fn run<T: Term>(&self, term: &T) -> T
    where
        S: Strategy<T>,
    {
        self.0.apply(term).unwrap_or_else(|| term.clone())
    }
}

/// Bottom-up traversal: rewrites every child first, rebuilds the parent via
/// `make_term` if any child changed, then tries the inner strategy on the
/// result. Leaves (no children) go to the inner strategy directly.
pub struct PostWalk<S>(pub S);

impl<T: Term, S: Strategy<T>> Strategy<T> for PostWalk<S> {
    fn apply(&self, term: &T) -> Option<T> {
        let rebuilt = term.children().and_then(|children| {
            let mut changed = false;
            let new_children: Vec<T> = children
                .iter()
                .map(|child| match self.apply(child) {
                    Some(new) => {
                        changed = true;
                        new
                    }
                    None => child.clone(),
                })
                .collect();
            changed.then(|| T::make_term(term.head(), new_children))
        });

        match rebuilt {
            Some(node) => Some(self.0.apply(&node).unwrap_or(node)),
            None => self.0.apply(term),
        }
    }
}

/// Applies the inner strategy repeatedly, feeding each result back in,
/// until no rewrite fires or the output is structurally equal to the
/// input. Termination beyond that is the rule author's responsibility;
/// the driver itself never retries past a fixed point.
pub struct Fixpoint<S>(pub S);

impl<T: Term, S: Strategy<T>> Strategy<T> for Fixpoint<S> {
    fn apply(&self, term: &T) -> Option<T> {
        let mut current = self.0.apply(term)?;
        let mut rounds = 1usize;
        loop {
            match self.0.apply(&current) {
                None => break,
                Some(next) => {
                    if next == current {
                        break;
                    }
                    current = next;
                    rounds += 1;
                }
            }
        }
        log::debug!("fixpoint reached after {rounds} round(s)");
        Some(current)
    }
}

/// Applies each stage to the output of the previous one, in order, exactly
/// once each. Stages may themselves be fixpoints.
pub struct Chain<T: Term> {
    stages: Vec<Box<dyn Strategy<T>>>,
}

impl<T: Term> Chain<T> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn then(mut self, stage: impl Strategy<T> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

impl<T: Term> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Term> Strategy<T> for Chain<T> {
    fn apply(&self, term: &T) -> Option<T> {
        let mut current: Option<T> = None;
        for stage in &self.stages {
            let input = current.as_ref().unwrap_or(term);
            if let Some(next) = stage.apply(input) {
                current = Some(next);
            }
        }
        current
    }
}
