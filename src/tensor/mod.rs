//! The array language.
//!
//! Programs are module/function/assign/return skeletons whose expressions
//! apply whole-array operations. The language runs two ways: directly on
//! buffers ([`interp`]) or lowered to the imperative IR ([`lower`]) and
//! executed by either imperative backend. A rewrite pass over the same
//! term model simplifies programs before lowering.

pub mod interp;
pub mod lower;

use std::fmt;

use crate::error::Error;
use crate::ftype::{ElemType, FType};
use crate::imp::Var;
use crate::term::rewrite::{Fixpoint, PostWalk, Rewrite};
use crate::term::{unpack, Term};
use crate::value::Const;

/// Whole-array primitives. Elementwise operations require operand shapes
/// to agree; `mkarray` builds a rank-1 buffer from scalar arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TensorOp {
    MkArray,
    Neg,
    Add,
    Sub,
}

impl TensorOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorOp::MkArray => "mkarray",
            TensorOp::Neg => "neg",
            TensorOp::Add => "add",
            TensorOp::Sub => "sub",
        }
    }
}

impl fmt::Display for TensorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Literal(Const),
    Variable(Var),
    Call { op: TensorOp, args: Vec<Node> },
    Assign { lhs: Box<Node>, rhs: Box<Node> },
    Return(Box<Node>),
    Block(Vec<Node>),
    Function {
        name: Box<Node>,
        params: Vec<Node>,
        body: Box<Node>,
    },
    Module(Vec<Node>),
}

/// Heads carry the operator for `Call`, so rebuilding a call after its
/// children were rewritten preserves which primitive it applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Literal,
    Variable,
    Call(TensorOp),
    Assign,
    Return,
    Block,
    Function,
    Module,
}

impl Term for Node {
    type Head = NodeKind;

    fn head(&self) -> NodeKind {
        match self {
            Node::Literal(_) => NodeKind::Literal,
            Node::Variable(_) => NodeKind::Variable,
            Node::Call { op, .. } => NodeKind::Call(*op),
            Node::Assign { .. } => NodeKind::Assign,
            Node::Return(_) => NodeKind::Return,
            Node::Block(_) => NodeKind::Block,
            Node::Function { .. } => NodeKind::Function,
            Node::Module(_) => NodeKind::Module,
        }
    }

    fn children(&self) -> Option<Vec<Node>> {
        match self {
            Node::Literal(_) | Node::Variable(_) => None,
            Node::Call { args, .. } => Some(args.clone()),
            Node::Assign { lhs, rhs } => Some(vec![(**lhs).clone(), (**rhs).clone()]),
            Node::Return(inner) => Some(vec![(**inner).clone()]),
            Node::Block(items) | Node::Module(items) => Some(items.clone()),
            Node::Function { name, params, body } => {
                let mut children = vec![(**name).clone(), (**body).clone()];
                children.extend(params.iter().cloned());
                Some(children)
            }
        }
    }

    fn make_term(head: NodeKind, mut children: Vec<Node>) -> Node {
        match head {
            NodeKind::Literal | NodeKind::Variable => {
                panic!("{head:?} is a leaf and cannot be rebuilt from children")
            }
            NodeKind::Call(op) => Node::Call { op, args: children },
            NodeKind::Assign => {
                let [lhs, rhs] = unpack::<Node, 2>(head, children);
                Node::Assign {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            NodeKind::Return => {
                let [inner] = unpack::<Node, 1>(head, children);
                Node::Return(Box::new(inner))
            }
            NodeKind::Block => Node::Block(children),
            NodeKind::Module => Node::Module(children),
            NodeKind::Function => {
                assert!(
                    children.len() >= 2,
                    "Function takes at least 2 children, got {}",
                    children.len()
                );
                let params = children.split_off(2);
                let body = children.pop().expect("length checked");
                Node::Function {
                    name: Box::new(children.remove(0)),
                    body: Box::new(body),
                    params,
                }
            }
        }
    }
}

// ─── Constructors ──────────────────────────────────────────────────

impl Node {
    pub fn int(value: i64) -> Node {
        Node::Literal(Const::Int(value))
    }

    pub fn float(value: f64) -> Node {
        Node::Literal(Const::Float(value))
    }

    pub fn var(v: &Var) -> Node {
        Node::Variable(v.clone())
    }

    pub fn call(op: TensorOp, args: Vec<Node>) -> Node {
        Node::Call { op, args }
    }

    pub fn assign(lhs: &Var, rhs: Node) -> Node {
        Node::Assign {
            lhs: Box::new(Node::var(lhs)),
            rhs: Box::new(rhs),
        }
    }

    pub fn ret(value: Node) -> Node {
        Node::Return(Box::new(value))
    }

    pub fn block(stmts: Vec<Node>) -> Node {
        Node::Block(stmts)
    }

    pub fn function(name: Var, params: Vec<Var>, body: Node) -> Node {
        Node::Function {
            name: Box::new(Node::Variable(name)),
            params: params.into_iter().map(Node::Variable).collect(),
            body: Box::new(body),
        }
    }

    pub fn module(functions: Vec<Node>) -> Node {
        Node::Module(functions)
    }
}

// ─── Printing ──────────────────────────────────────────────────────

fn write_node(ctx: &mut crate::imp::print::PrintCtx, node: &Node) {
    match node {
        Node::Module(functions) => {
            ctx.line("module {");
            ctx.nested(|ctx| {
                for function in functions {
                    write_node(ctx, function);
                }
            });
            ctx.line("}");
        }
        Node::Function { name, params, body } => {
            let (fn_name, ret) = match &**name {
                Node::Variable(v) => (v.name.clone(), v.ftype.to_string()),
                other => (expr_str(other), "?".to_string()),
            };
            let params: Vec<String> = params
                .iter()
                .map(|p| match p {
                    Node::Variable(v) => format!("{}: {}", v.name, v.ftype),
                    other => expr_str(other),
                })
                .collect();
            ctx.line(format!(
                "function {fn_name}({}) -> {ret} {{",
                params.join(", ")
            ));
            ctx.nested(|ctx| match &**body {
                Node::Block(stmts) => {
                    for stmt in stmts {
                        write_node(ctx, stmt);
                    }
                }
                other => write_node(ctx, other),
            });
            ctx.line("}");
        }
        Node::Block(stmts) => {
            ctx.line("{");
            ctx.nested(|ctx| {
                for stmt in stmts {
                    write_node(ctx, stmt);
                }
            });
            ctx.line("}");
        }
        Node::Assign { lhs, rhs } => {
            ctx.line(format!("{} = {}", expr_str(lhs), expr_str(rhs)));
        }
        Node::Return(value) => {
            ctx.line(format!("return {}", expr_str(value)));
        }
        expr => ctx.line(expr_str(expr)),
    }
}

fn expr_str(node: &Node) -> String {
    match node {
        Node::Literal(value) => value.to_string(),
        Node::Variable(v) => v.name.clone(),
        Node::Call { op, args } => {
            let args: Vec<String> = args.iter().map(expr_str).collect();
            format!("{op}({})", args.join(", "))
        }
        statement => {
            let mut ctx = crate::imp::print::PrintCtx::new();
            write_node(&mut ctx, statement);
            ctx.emit()
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ctx = crate::imp::print::PrintCtx::new();
        write_node(&mut ctx, self);
        write!(f, "{}", ctx.emit())
    }
}

// ─── Typing ────────────────────────────────────────────────────────

/// Compute the FType an expression produces without evaluating it; this
/// is what sizes output buffers ahead of execution.
pub fn result_ftype(node: &Node) -> Result<FType, Error> {
    match node {
        Node::Literal(Const::Int(_)) => Ok(FType::Scalar(ElemType::I64)),
        Node::Literal(Const::Float(_)) => Ok(FType::Scalar(ElemType::F64)),
        Node::Variable(v) => Ok(v.ftype.clone()),
        Node::Call { op, args } => match op {
            TensorOp::MkArray => {
                if args.is_empty() {
                    return Err(Error::Arity {
                        name: "mkarray".to_string(),
                        expected: 1,
                        got: 0,
                    });
                }
                let mut elem = ElemType::I64;
                for arg in args {
                    match result_ftype(arg)? {
                        FType::Scalar(ElemType::F64) => elem = ElemType::F64,
                        FType::Scalar(ElemType::I64) => {}
                        other => {
                            return Err(Error::mismatch(format!(
                                "mkarray takes scalars, got {other}"
                            )))
                        }
                    }
                }
                Ok(FType::tensor(elem, 1))
            }
            TensorOp::Neg => {
                let [arg] = require_args::<1>(op, args)?;
                let ftype = result_ftype(arg)?;
                if !ftype.is_tensor() {
                    return Err(Error::mismatch(format!("neg takes a buffer, got {ftype}")));
                }
                Ok(ftype)
            }
            TensorOp::Add | TensorOp::Sub => {
                let [lhs, rhs] = require_args::<2>(op, args)?;
                let left = result_ftype(lhs)?;
                let right = result_ftype(rhs)?;
                if !left.is_tensor() || left != right {
                    return Err(Error::mismatch(format!(
                        "{op} takes two buffers of the same ftype, got {left} and {right}"
                    )));
                }
                Ok(left)
            }
        },
        other => Err(Error::unsupported(
            format!("{:?}", other.head()),
            "tensor result_ftype",
        )),
    }
}

fn require_args<'a, const N: usize>(
    op: &TensorOp,
    args: &'a [Node],
) -> Result<[&'a Node; N], Error> {
    let refs: Vec<&Node> = args.iter().collect();
    <[&Node; N]>::try_from(refs).map_err(|_| Error::Arity {
        name: op.as_str().to_string(),
        expected: N,
        got: args.len(),
    })
}

// ─── Simplification ────────────────────────────────────────────────

/// Algebraic cleanup over the term model, run before lowering:
/// `neg(neg(t))` collapses and `add(t, neg(u))` becomes `sub(t, u)`.
pub fn simplify(node: &Node) -> Node {
    Rewrite(Fixpoint(PostWalk(simplify_rule))).run(node)
}

fn simplify_rule(node: &Node) -> Option<Node> {
    match node {
        Node::Call {
            op: TensorOp::Neg,
            args,
        } => match args.as_slice() {
            [Node::Call {
                op: TensorOp::Neg,
                args: inner,
            }] => inner.first().cloned(),
            _ => None,
        },
        Node::Call {
            op: TensorOp::Add,
            args,
        } => match args.as_slice() {
            [lhs, Node::Call {
                op: TensorOp::Neg,
                args: inner,
            }] => inner
                .first()
                .map(|rhs| Node::call(TensorOp::Sub, vec![lhs.clone(), rhs.clone()])),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_head_carries_operator() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let call = Node::call(TensorOp::Neg, vec![Node::var(&a)]);
        let rebuilt = Node::make_term(call.head(), call.children().unwrap());
        assert_eq!(rebuilt, call);
        assert_ne!(
            call.head(),
            Node::call(TensorOp::Add, vec![]).head()
        );
    }

    #[test]
    fn test_double_negation_cancels() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let twice = Node::call(
            TensorOp::Neg,
            vec![Node::call(TensorOp::Neg, vec![Node::var(&a)])],
        );
        assert_eq!(simplify(&twice), Node::var(&a));
    }

    #[test]
    fn test_add_of_negation_becomes_sub() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let b = Var::tensor("b", ElemType::I64, 1);
        let sum = Node::call(
            TensorOp::Add,
            vec![
                Node::var(&a),
                Node::call(TensorOp::Neg, vec![Node::var(&b)]),
            ],
        );
        assert_eq!(
            simplify(&sum),
            Node::call(TensorOp::Sub, vec![Node::var(&a), Node::var(&b)])
        );
    }

    #[test]
    fn test_rendering() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let b = Var::tensor("b", ElemType::I64, 1);
        let f = Node::function(
            Var::tensor("negate", ElemType::I64, 1),
            vec![a.clone()],
            Node::block(vec![
                Node::assign(&b, Node::call(TensorOp::Neg, vec![Node::var(&a)])),
                Node::ret(Node::var(&b)),
            ]),
        );
        assert_eq!(
            f.to_string(),
            "function negate(a: buf<i64, 1>) -> buf<i64, 1> {\n    b = neg(a)\n    return b\n}"
        );
    }

    #[test]
    fn test_result_ftype_rules() {
        let a = Var::tensor("a", ElemType::I64, 2);
        let b = Var::tensor("b", ElemType::I64, 2);
        let sum = Node::call(TensorOp::Add, vec![Node::var(&a), Node::var(&b)]);
        assert_eq!(result_ftype(&sum).unwrap(), FType::tensor(ElemType::I64, 2));

        let mk = Node::call(TensorOp::MkArray, vec![Node::int(1), Node::float(2.0)]);
        assert_eq!(result_ftype(&mk).unwrap(), FType::tensor(ElemType::F64, 1));

        let c = Var::tensor("c", ElemType::I64, 1);
        let bad = Node::call(TensorOp::Add, vec![Node::var(&a), Node::var(&c)]);
        assert!(result_ftype(&bad).is_err());
    }
}
