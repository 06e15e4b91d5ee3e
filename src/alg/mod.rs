//! The arithmetic expression language.
//!
//! Expressions are built by the parser, by the `std::ops` overloads below,
//! or by the normalizer rebuilding nodes. They print fully parenthesized
//! and round-trip through [`crate::parser::parse_expr`].

pub mod interp;
pub mod normalize;

use std::fmt;

use crate::term::{unpack, Term};
use crate::value::Const;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Literal(Const),
    Variable(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal,
    Variable,
    Add,
    Sub,
    Mul,
    Pow,
}

impl Term for Expr {
    type Head = ExprKind;

    fn head(&self) -> ExprKind {
        match self {
            Expr::Literal(_) => ExprKind::Literal,
            Expr::Variable(_) => ExprKind::Variable,
            Expr::Add(..) => ExprKind::Add,
            Expr::Sub(..) => ExprKind::Sub,
            Expr::Mul(..) => ExprKind::Mul,
            Expr::Pow(..) => ExprKind::Pow,
        }
    }

    fn children(&self) -> Option<Vec<Expr>> {
        match self {
            Expr::Literal(_) | Expr::Variable(_) => None,
            Expr::Add(l, r) | Expr::Sub(l, r) | Expr::Mul(l, r) | Expr::Pow(l, r) => {
                Some(vec![(**l).clone(), (**r).clone()])
            }
        }
    }

    fn make_term(head: ExprKind, children: Vec<Expr>) -> Expr {
        let build: fn(Box<Expr>, Box<Expr>) -> Expr = match head {
            ExprKind::Add => Expr::Add,
            ExprKind::Sub => Expr::Sub,
            ExprKind::Mul => Expr::Mul,
            ExprKind::Pow => Expr::Pow,
            ExprKind::Literal | ExprKind::Variable => {
                panic!("{head:?} is a leaf and cannot be rebuilt from children")
            }
        };
        let [left, right] = unpack::<Expr, 2>(head, children);
        build(Box::new(left), Box::new(right))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Add(l, r) => write!(f, "({l} + {r})"),
            Expr::Sub(l, r) => write!(f, "({l} - {r})"),
            Expr::Mul(l, r) => write!(f, "({l} * {r})"),
            Expr::Pow(l, r) => write!(f, "({l} ^ {r})"),
        }
    }
}

/// Integer literal.
pub fn lit(value: i64) -> Expr {
    Expr::Literal(Const::Int(value))
}

/// Float literal.
pub fn litf(value: f64) -> Expr {
    Expr::Literal(Const::Float(value))
}

/// Named variable.
pub fn var(name: &str) -> Expr {
    Expr::Variable(name.to_string())
}

impl Expr {
    pub fn pow(self, exponent: Expr) -> Expr {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}
