//! The generic term model.
//!
//! Every language in this crate represents programs as an immutable tagged
//! tree. The [`Term`] trait is the contract the rewrite engine works
//! against: a stable *head* discriminant, an ordered view of the immediate
//! children, and a way to rebuild a node after its children were rewritten.
//! Leaves report "no children" by returning `None`, and the engine hands
//! them to rules directly instead of trying to decompose them.

pub mod rewrite;

use std::fmt;

/// An immutable tagged tree node.
///
/// Implementations are closed enums deriving structural `PartialEq`/`Hash`,
/// so two terms are equal iff their heads match and all children are
/// pairwise equal, in order.
pub trait Term: Clone + PartialEq + fmt::Debug {
    /// The head discriminant. Stable, cheap, and comparable; for nodes that
    /// are parameterized by an operator (e.g. a tensor `Call`), the head
    /// carries the operator so rebuilding preserves it.
    type Head: Copy + Eq + fmt::Debug;

    fn head(&self) -> Self::Head;

    /// Ordered immediate sub-terms, or `None` for leaf kinds that do not
    /// support decomposition.
    fn children(&self) -> Option<Vec<Self>>;

    /// Rebuild a node of kind `head` from explicit children.
    ///
    /// Only called by the engine with children taken from a node of the
    /// same head, so the arity always matches; a leaf head or a wrong
    /// child count is a programming error and panics.
    fn make_term(head: Self::Head, children: Vec<Self>) -> Self;

    /// Number of nodes in the term, counting this one.
    fn size(&self) -> usize {
        match self.children() {
            None => 1,
            Some(children) => 1 + children.iter().map(Term::size).sum::<usize>(),
        }
    }
}

/// Structural equality with an explicit stack.
///
/// Derived `PartialEq` recurses, which is fine for realistic program sizes;
/// this variant stays flat for degenerate, very deep chains.
pub fn structural_eq<T: Term>(a: &T, b: &T) -> bool {
    let mut stack: Vec<(T, T)> = vec![(a.clone(), b.clone())];
    while let Some((x, y)) = stack.pop() {
        if x.head() != y.head() {
            return false;
        }
        match (x.children(), y.children()) {
            (None, None) => {
                if x != y {
                    return false;
                }
            }
            (Some(xs), Some(ys)) => {
                if xs.len() != ys.len() {
                    return false;
                }
                stack.extend(xs.into_iter().zip(ys));
            }
            _ => return false,
        }
    }
    true
}

/// Split a children vector into a fixed-arity array.
///
/// Helper for `make_term` implementations; panics on arity mismatch, which
/// cannot happen for children produced by `children()` of the same head.
pub fn unpack<T: Term, const N: usize>(head: T::Head, children: Vec<T>) -> [T; N] {
    match <[T; N]>::try_from(children) {
        Ok(array) => array,
        Err(children) => panic!(
            "{head:?} takes {N} child(ren), got {}",
            children.len()
        ),
    }
}
