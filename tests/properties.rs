//! Property tests: print/parse round-tripping, fixpoint idempotence, and
//! normalization as a meaning-preserving transformation.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use skiff::alg::interp::Evaluator;
use skiff::alg::normalize::normalize;
use skiff::alg::{lit, var, Expr};
use skiff::parse_expr;
use skiff::value::Const;
use skiff::{Fixpoint, PostWalk, Rewrite, Value};

/// Small polynomial-shaped expressions over the single variable `x`.
/// Depth and constants are kept small so integer evaluation stays exact.
fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![(-3i64..=3).prop_map(lit), Just(var("x"))];
    leaf.prop_recursive(3, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a + b),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a - b),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a * b),
            (inner, 0i64..=2).prop_map(|(a, n)| a.pow(lit(n))),
        ]
    })
}

/// Literal-only folding, used to exercise the engine with a rule set
/// independent of the full normalizer.
fn fold(expr: &Expr) -> Option<Expr> {
    let both = |l: &Expr, r: &Expr| -> Option<(Const, Const)> {
        match (l, r) {
            (Expr::Literal(a), Expr::Literal(b)) => Some((a.clone(), b.clone())),
            _ => None,
        }
    };
    match expr {
        Expr::Add(l, r) => both(l, r).and_then(|(a, b)| a.add(&b)).map(Expr::Literal),
        Expr::Mul(l, r) => both(l, r).and_then(|(a, b)| a.mul(&b)).map(Expr::Literal),
        Expr::Pow(l, r) => both(l, r).and_then(|(a, b)| a.pow(&b)).map(Expr::Literal),
        _ => None,
    }
}

proptest! {
    #[test]
    fn prop_print_parse_round_trip(expr in arb_expr()) {
        let rendered = expr.to_string();
        let reparsed = parse_expr(&rendered)
            .map_err(|diags| TestCaseError::fail(format!("{rendered:?}: {diags:?}")))?;
        prop_assert_eq!(reparsed, expr);
    }

    #[test]
    fn prop_fixpoint_is_idempotent(expr in arb_expr()) {
        let once = Rewrite(Fixpoint(PostWalk(fold))).run(&expr);
        let twice = Rewrite(Fixpoint(PostWalk(fold))).run(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_normalize_is_idempotent(expr in arb_expr()) {
        let once = normalize(&expr);
        let twice = normalize(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_normalize_preserves_meaning(expr in arb_expr(), x in -4i64..=4) {
        let evaluator = Evaluator::with_bindings([("x".to_string(), Value::Int(x))]);
        let before = evaluator.eval(&expr).unwrap();
        let after = evaluator.eval(&normalize(&expr)).unwrap();
        prop_assert_eq!(before, after);
    }
}
