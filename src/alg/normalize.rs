//! Canonicalization of polynomial-shaped expressions.
//!
//! The normal form is a right-nested additive chain in strictly descending
//! exponent order with an explicit coefficient on every power and a
//! constant tail:
//!
//! ```text
//! ((a * x^n) + ((b * x^(n-1)) + ... + ((k * x) + c)))
//! ```
//!
//! Every exponent from the leading one down to 1 is present, with
//! zero-coefficient placeholders filling the gaps; a bare numeric literal
//! is also normal. The pipeline is a [`Chain`] of fixpointed rule sets:
//! expansion, term ordering, root shaping, and chain completion. Rules
//! target univariate polynomials, which is exactly the domain
//! [`is_normalized`] can certify; anything else is rewritten soundly but
//! may not reach the certified shape.

use crate::alg::{lit, Expr};
use crate::term::rewrite::{Chain, Fixpoint, PostWalk, Rewrite};
use crate::value::Const;

/// Rewrite an expression to canonical polynomial form.
pub fn normalize(expr: &Expr) -> Expr {
    let pipeline = Chain::<Expr>::new()
        .then(Fixpoint(PostWalk(expand)))
        .then(Fixpoint(PostWalk(order_terms)))
        .then(Fixpoint(shape_root))
        .then(Fixpoint(PostWalk(complete_chain)));
    Rewrite(pipeline).run(expr)
}

/// Check whether an expression is in canonical polynomial form.
pub fn is_normalized(expr: &Expr) -> bool {
    chain_shape(expr).is_some()
}

/// The variable and leading exponent of a canonical chain, or `None` when
/// the shape is not canonical. A bare literal reports exponent 0.
fn chain_shape(expr: &Expr) -> Option<(Option<&str>, i64)> {
    match expr {
        Expr::Literal(c) if c.is_numeric() => Some((None, 0)),
        Expr::Add(head, rest) => {
            let Expr::Mul(coeff, atom) = &**head else {
                return None;
            };
            if numeric_lit(coeff).is_none() {
                return None;
            }
            match &**atom {
                Expr::Variable(x) => match &**rest {
                    Expr::Literal(c) if c.is_numeric() => Some((Some(x.as_str()), 1)),
                    _ => None,
                },
                Expr::Pow(base, exponent) => {
                    let Expr::Variable(x) = &**base else {
                        return None;
                    };
                    let n = lit_int(exponent)?;
                    if n < 2 {
                        return None;
                    }
                    let (inner_var, m) = chain_shape(rest)?;
                    if inner_var == Some(x.as_str()) && n == m + 1 {
                        Some((Some(x.as_str()), n))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        }
        _ => None,
    }
}

// ─── Stage 1: expansion ────────────────────────────────────────────

/// Fold constants, eliminate subtraction, unroll literal powers,
/// distribute multiplication over addition, float coefficients to the
/// front of monomials, collect like powers, and re-associate to
/// right-nested chains.
fn expand(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Add(l, r) => {
            if let (Some(a), Some(b)) = (numeric_lit(l), numeric_lit(r)) {
                return a.add(b).map(Expr::Literal);
            }
            if let Expr::Add(a, b) = &**l {
                // (a + b) + r  →  a + (b + r)
                return Some(Expr::Add(
                    a.clone(),
                    Box::new(Expr::Add(b.clone(), r.clone())),
                ));
            }
            None
        }
        Expr::Sub(l, r) => Some(Expr::Add(
            l.clone(),
            Box::new(Expr::Mul(Box::new(lit(-1)), r.clone())),
        )),
        Expr::Mul(l, r) => expand_mul(l, r),
        Expr::Pow(base, exponent) => {
            if let (Some(b), Some(e)) = (numeric_lit(base), numeric_lit(exponent)) {
                return b.pow(e).map(Expr::Literal);
            }
            match lit_int(exponent) {
                Some(0) => Some(lit(1)),
                Some(1) => Some((**base).clone()),
                Some(n) if n >= 2 && !matches!(**base, Expr::Variable(_)) => {
                    // Unroll so distribution can reach the factors; powers
                    // of a bare variable stay intact as monomial atoms.
                    Some(Expr::Mul(
                        base.clone(),
                        Box::new(Expr::Pow(base.clone(), Box::new(lit(n - 1)))),
                    ))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn expand_mul(l: &Expr, r: &Expr) -> Option<Expr> {
    if let (Some(a), Some(b)) = (numeric_lit(l), numeric_lit(r)) {
        return a.mul(b).map(Expr::Literal);
    }
    if let Expr::Add(a, b) = l {
        // (a + b) * r  →  a*r + b*r
        return Some(Expr::Add(
            Box::new(Expr::Mul(a.clone(), Box::new(r.clone()))),
            Box::new(Expr::Mul(b.clone(), Box::new(r.clone()))),
        ));
    }
    if let Expr::Add(a, b) = r {
        return Some(Expr::Add(
            Box::new(Expr::Mul(Box::new(l.clone()), a.clone())),
            Box::new(Expr::Mul(Box::new(l.clone()), b.clone())),
        ));
    }
    if let Expr::Mul(a, b) = l {
        // (a * b) * r  →  a * (b * r)
        return Some(Expr::Mul(
            a.clone(),
            Box::new(Expr::Mul(b.clone(), Box::new(r.clone()))),
        ));
    }
    if numeric_lit(l).is_none() {
        // Coefficients migrate to the front of the monomial.
        if numeric_lit(r).is_some() {
            return Some(Expr::Mul(Box::new(r.clone()), Box::new(l.clone())));
        }
        if let Expr::Mul(c, rest) = r {
            if numeric_lit(c).is_some() {
                return Some(Expr::Mul(
                    c.clone(),
                    Box::new(Expr::Mul(Box::new(l.clone()), rest.clone())),
                ));
            }
        }
    }
    if let Some(a) = numeric_lit(l) {
        if let Expr::Mul(c, rest) = r {
            if let Some(b) = numeric_lit(c) {
                return a
                    .mul(b)
                    .map(|folded| Expr::Mul(Box::new(Expr::Literal(folded)), rest.clone()));
            }
        }
    }
    if let (Some((x, n)), Some((y, m))) = (atom_of(l), atom_of(r)) {
        if x == y {
            return Some(atom_expr(x, n + m));
        }
    }
    if let Expr::Mul(r1, r2) = r {
        if let (Some((x, n)), Some((y, m))) = (atom_of(l), atom_of(r1)) {
            if x == y {
                return Some(Expr::Mul(Box::new(atom_expr(x, n + m)), r2.clone()));
            }
        }
    }
    None
}

// ─── Stage 2: term ordering ────────────────────────────────────────

/// Shape additive elements into `coeff * atom` monomials, combine like
/// degrees, fold constants, and bubble terms into descending-degree order.
fn order_terms(expr: &Expr) -> Option<Expr> {
    let Expr::Add(l, r) = expr else {
        return None;
    };

    if let (Some(a), Some(b)) = (numeric_lit(l), numeric_lit(r)) {
        return a.add(b).map(Expr::Literal);
    }
    if let Some(a) = numeric_lit(l) {
        if let Expr::Add(r1, r2) = &**r {
            if let Some(b) = numeric_lit(r1) {
                return a
                    .add(b)
                    .map(|folded| Expr::Add(Box::new(Expr::Literal(folded)), r2.clone()));
            }
        }
    }

    // Shape the head and tail elements of the chain.
    if !is_shaped(l) && !matches!(**l, Expr::Add(..)) {
        if let Some((coeff, atom)) = mono_parts(l) {
            return Some(Expr::Add(Box::new(shaped(coeff, atom)), r.clone()));
        }
    }
    if !is_shaped(r) && !matches!(**r, Expr::Add(..)) {
        if let Some((coeff, atom)) = mono_parts(r) {
            return Some(Expr::Add(l.clone(), Box::new(shaped(coeff, atom))));
        }
    }

    // Combine adjacent like-degree terms of the same atom.
    if let Expr::Add(r1, r2) = &**r {
        if let (Some((ca, Some(aa))), Some((cb, Some(ab)))) = (mono_parts(l), mono_parts(r1)) {
            if aa == ab {
                let coeff = ca.add(&cb)?;
                return Some(Expr::Add(
                    Box::new(shaped(coeff, Some(aa))),
                    r2.clone(),
                ));
            }
        }
    } else if let (Some((ca, Some(aa))), Some((cb, Some(ab)))) = (mono_parts(l), mono_parts(r)) {
        if aa == ab {
            return Some(shaped(ca.add(&cb)?, Some(aa)));
        }
    }

    // Bubble toward descending degree.
    if let Expr::Add(r1, r2) = &**r {
        if let (Some(d1), Some(d2)) = (degree(l), degree(r1)) {
            if d1 < d2 {
                return Some(Expr::Add(
                    r1.clone(),
                    Box::new(Expr::Add(l.clone(), r2.clone())),
                ));
            }
        }
    } else if let (Some(d1), Some(d2)) = (degree(l), degree(r)) {
        if d1 < d2 {
            return Some(Expr::Add(r.clone(), l.clone()));
        }
    }

    None
}

// ─── Stage 3: root shaping ─────────────────────────────────────────

/// A lone monomial becomes a one-term chain with a zero constant tail, so
/// completion can fill the missing powers below it.
fn shape_root(expr: &Expr) -> Option<Expr> {
    if matches!(expr, Expr::Add(..)) {
        return None;
    }
    let (coeff, atom) = mono_parts(expr)?;
    let atom = atom?;
    Some(Expr::Add(
        Box::new(shaped(coeff, Some(atom))),
        Box::new(lit(0)),
    ))
}

// ─── Stage 4: chain completion ─────────────────────────────────────

/// Insert zero-coefficient placeholders for missing powers and a zero
/// constant tail when the chain ends on a monomial.
fn complete_chain(expr: &Expr) -> Option<Expr> {
    let Expr::Add(l, r) = expr else {
        return None;
    };
    let (_, Some((x, n))) = mono_parts(l)? else {
        return None;
    };

    let insert_gap = |upto: i64| {
        Expr::Add(
            l.clone(),
            Box::new(Expr::Add(Box::new(zero_mono(&x, upto)), r.clone())),
        )
    };

    match &**r {
        Expr::Literal(c) if c.is_numeric() => (n >= 2).then(|| insert_gap(n - 1)),
        Expr::Add(r1, _) => {
            let d = degree(r1)?;
            (n > d + 1).then(|| insert_gap(n - 1))
        }
        tail => {
            let (_, Some((_, m))) = mono_parts(tail)? else {
                return None;
            };
            if n > m + 1 {
                Some(insert_gap(n - 1))
            } else if n == m + 1 {
                // End the chain with an explicit constant.
                Some(Expr::Add(
                    l.clone(),
                    Box::new(Expr::Add(Box::new(tail.clone()), Box::new(lit(0)))),
                ))
            } else {
                None
            }
        }
    }
}

// ─── Monomial helpers ──────────────────────────────────────────────

fn numeric_lit(expr: &Expr) -> Option<&Const> {
    match expr {
        Expr::Literal(c) if c.is_numeric() => Some(c),
        _ => None,
    }
}

fn lit_int(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(c) => c.as_int(),
        _ => None,
    }
}

/// `x` or `x^n` (n ≥ 1), the variable part of a monomial.
fn atom_of(expr: &Expr) -> Option<(&str, i64)> {
    match expr {
        Expr::Variable(x) => Some((x, 1)),
        Expr::Pow(base, exponent) => match &**base {
            Expr::Variable(x) => {
                let n = lit_int(exponent)?;
                (n >= 1).then_some((x.as_str(), n))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Decompose a monomial into coefficient and optional variable atom.
fn mono_parts(expr: &Expr) -> Option<(Const, Option<(String, i64)>)> {
    if let Some(c) = numeric_lit(expr) {
        return Some((c.clone(), None));
    }
    if let Some((x, n)) = atom_of(expr) {
        return Some((Const::Int(1), Some((x.to_string(), n))));
    }
    if let Expr::Mul(l, r) = expr {
        if let (Some(c), Some((x, n))) = (numeric_lit(l), atom_of(r)) {
            return Some((c.clone(), Some((x.to_string(), n))));
        }
    }
    None
}

fn degree(expr: &Expr) -> Option<i64> {
    let (_, atom) = mono_parts(expr)?;
    Some(atom.map(|(_, n)| n).unwrap_or(0))
}

/// A monomial already written as `Literal` or `Mul(Literal, atom)`.
fn is_shaped(expr: &Expr) -> bool {
    if numeric_lit(expr).is_some() {
        return true;
    }
    match expr {
        Expr::Mul(l, r) => numeric_lit(l).is_some() && atom_of(r).is_some(),
        _ => false,
    }
}

fn atom_expr(x: &str, n: i64) -> Expr {
    debug_assert!(n >= 1);
    if n == 1 {
        Expr::Variable(x.to_string())
    } else {
        Expr::Pow(
            Box::new(Expr::Variable(x.to_string())),
            Box::new(lit(n)),
        )
    }
}

fn shaped(coeff: Const, atom: Option<(String, i64)>) -> Expr {
    match atom {
        None => Expr::Literal(coeff),
        Some((x, n)) => Expr::Mul(
            Box::new(Expr::Literal(coeff)),
            Box::new(atom_expr(&x, n)),
        ),
    }
}

fn zero_mono(x: &str, n: i64) -> Expr {
    Expr::Mul(Box::new(lit(0)), Box::new(atom_expr(x, n)))
}
