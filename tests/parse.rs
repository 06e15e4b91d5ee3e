//! Surface-syntax parsing: precedence, associativity, and round-tripping.

use skiff::alg::{lit, litf, var, Expr};
use skiff::parse_expr;

fn cases() -> Vec<(&'static str, Expr)> {
    vec![
        ("42", lit(42)),
        ("x", var("x")),
        ("2 + 3", lit(2) + lit(3)),
        ("4 * 7", lit(4) * lit(7)),
        ("2 ^ 3", lit(2).pow(lit(3))),
        ("(2 + 3) * 4", (lit(2) + lit(3)) * lit(4)),
        ("(2 ^ 3) + (4 * 5)", lit(2).pow(lit(3)) + lit(4) * lit(5)),
        ("2.5 * 4.0", litf(2.5) * litf(4.0)),
        ("2.0 ^ 0.5", litf(2.0).pow(litf(0.5))),
        ("2 + x * 4", lit(2) + var("x") * lit(4)),
        ("2 * 3 + 4", lit(2) * lit(3) + lit(4)),
        ("y ^ 3 * 4", var("y").pow(lit(3)) * lit(4)),
        ("2 * 3 ^ 4", lit(2) * lit(3).pow(lit(4))),
        ("a + 3 - 4", var("a") + lit(3) - lit(4)),
        ("2 * 3 * 4", lit(2) * lit(3) * lit(4)),
        ("2 ^ z + 4", lit(2).pow(var("z")) + lit(4)),
        ("2 - 3 * 4", lit(2) - lit(3) * lit(4)),
        ("2 * b - 4", lit(2) * var("b") - lit(4)),
        ("2 ^ 3 ^ 4", lit(2).pow(lit(3).pow(lit(4)))),
        ("(x + 3) * (4 - 5)", (var("x") + lit(3)) * (lit(4) - lit(5))),
        ("(2 ^ 3) ^ (4 + 1)", lit(2).pow(lit(3)).pow(lit(4) + lit(1))),
        ("2 + 3 - 4 - 5", lit(2) + lit(3) - lit(4) - lit(5)),
        ("y * 3 + 4 * 5", var("y") * lit(3) + lit(4) * lit(5)),
        (
            "1 + 2 * 3 ^ 4 - 5",
            lit(1) + lit(2) * lit(3).pow(lit(4)) - lit(5),
        ),
        (
            "(1 + 2) * (3 + 4) + 5",
            (lit(1) + lit(2)) * (lit(3) + lit(4)) + lit(5),
        ),
        (
            "2 ^ (3 + n) * (5 - 1)",
            lit(2).pow(lit(3) + var("n")) * (lit(5) - lit(1)),
        ),
    ]
}

#[test]
fn test_parse_table() {
    for (source, expected) in cases() {
        let parsed = parse_expr(source).unwrap_or_else(|diags| {
            panic!("parsing {source:?} failed with {diags:?}");
        });
        assert_eq!(parsed, expected, "parsing {source:?}");
    }
}

#[test]
fn test_printing_round_trips_through_parser() {
    for (source, expected) in cases() {
        let rendered = expected.to_string();
        let reparsed = parse_expr(&rendered).unwrap_or_else(|diags| {
            panic!("round-tripping {source:?} via {rendered:?} failed with {diags:?}");
        });
        assert_eq!(reparsed, expected, "round trip of {source:?} via {rendered:?}");
    }
}

#[test]
fn test_parse_errors_carry_spans() {
    let diags = parse_expr("1 + * 2").unwrap_err();
    assert!(!diags.is_empty());
    assert!(diags[0].span.start >= 4);
}
