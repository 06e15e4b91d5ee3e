//! The buffer-level imperative IR.
//!
//! One closed node enum covers expressions, statements, and program
//! structure, so the whole language is a [`Term`] and generic traversals
//! apply everywhere. Both execution backends consume exactly this IR.

pub mod interp;
pub mod print;

use crate::error::Error;
use crate::ftype::{ElemType, FType};
use crate::term::{unpack, Term};
use crate::value::{Const, OpKind};

/// A typed variable: the imperative IR declares the FType of every name at
/// its binding and use sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Var {
    pub name: String,
    pub ftype: FType,
}

impl Var {
    pub fn new(name: impl Into<String>, ftype: FType) -> Self {
        Self {
            name: name.into(),
            ftype,
        }
    }

    pub fn scalar(name: impl Into<String>, elem: ElemType) -> Self {
        Self::new(name, FType::Scalar(elem))
    }

    pub fn tensor(name: impl Into<String>, elem: ElemType, ndim: usize) -> Self {
        Self::new(name, FType::tensor(elem, ndim))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    /// A literal value.
    Literal(Const),
    /// A typed variable reference.
    Variable(Var),
    /// Operator application; `op` is usually a `Literal(Const::Op(_))`.
    Call { op: Box<Node>, args: Vec<Node> },
    /// Element read: `buffer[index...]`.
    Load { buffer: Box<Node>, index: Vec<Node> },
    /// Element write: `buffer[index...] = value`.
    Store {
        buffer: Box<Node>,
        index: Vec<Node>,
        value: Box<Node>,
    },
    /// Total element count of a buffer.
    Length(Box<Node>),
    /// The shape of a buffer, as a tuple of extents.
    Shape(Box<Node>),
    /// Field projection out of a tuple or record; `attr` is a string
    /// literal (`element_0`, `element_1`, ... for tuples).
    GetAttr { object: Box<Node>, attr: Box<Node> },
    /// Bind or update a variable.
    Assign { lhs: Box<Node>, rhs: Box<Node> },
    If {
        cond: Box<Node>,
        body: Box<Node>,
    },
    IfElse {
        cond: Box<Node>,
        then_body: Box<Node>,
        else_body: Box<Node>,
    },
    /// Counted loop over `start .. end`, rebinding `var` each iteration in
    /// a fresh frame.
    For {
        var: Box<Node>,
        start: Box<Node>,
        end: Box<Node>,
        body: Box<Node>,
    },
    /// Unwind to the enclosing function boundary with a value.
    Return(Box<Node>),
    Block(Vec<Node>),
    /// `name` is a `Variable` carrying the declared return FType.
    Function {
        name: Box<Node>,
        params: Vec<Node>,
        body: Box<Node>,
    },
    Module(Vec<Node>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Literal,
    Variable,
    Call,
    Load,
    Store,
    Length,
    Shape,
    GetAttr,
    Assign,
    If,
    IfElse,
    For,
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
            Node::Call { .. } => NodeKind::Call,
            Node::Load { .. } => NodeKind::Load,
            Node::Store { .. } => NodeKind::Store,
            Node::Length(_) => NodeKind::Length,
            Node::Shape(_) => NodeKind::Shape,
            Node::GetAttr { .. } => NodeKind::GetAttr,
            Node::Assign { .. } => NodeKind::Assign,
            Node::If { .. } => NodeKind::If,
            Node::IfElse { .. } => NodeKind::IfElse,
            Node::For { .. } => NodeKind::For,
            Node::Return(_) => NodeKind::Return,
            Node::Block(_) => NodeKind::Block,
            Node::Function { .. } => NodeKind::Function,
            Node::Module(_) => NodeKind::Module,
        }
    }

    /// Children orders match `make_term`: fixed-arity parts first, the
    /// variadic tail last (`Store` carries `[buffer, value, index...]`,
    /// `Function` carries `[name, body, params...]`).
    fn children(&self) -> Option<Vec<Node>> {
        match self {
            Node::Literal(_) | Node::Variable(_) => None,
            Node::Call { op, args } => {
                let mut children = vec![(**op).clone()];
                children.extend(args.iter().cloned());
                Some(children)
            }
            Node::Load { buffer, index } => {
                let mut children = vec![(**buffer).clone()];
                children.extend(index.iter().cloned());
                Some(children)
            }
            Node::Store {
                buffer,
                index,
                value,
            } => {
                let mut children = vec![(**buffer).clone(), (**value).clone()];
                children.extend(index.iter().cloned());
                Some(children)
            }
            Node::Length(inner) | Node::Shape(inner) | Node::Return(inner) => {
                Some(vec![(**inner).clone()])
            }
            Node::GetAttr { object, attr } => Some(vec![(**object).clone(), (**attr).clone()]),
            Node::Assign { lhs, rhs } => Some(vec![(**lhs).clone(), (**rhs).clone()]),
            Node::If { cond, body } => Some(vec![(**cond).clone(), (**body).clone()]),
            Node::IfElse {
                cond,
                then_body,
                else_body,
            } => Some(vec![
                (**cond).clone(),
                (**then_body).clone(),
                (**else_body).clone(),
            ]),
            Node::For {
                var,
                start,
                end,
                body,
            } => Some(vec![
                (**var).clone(),
                (**start).clone(),
                (**end).clone(),
                (**body).clone(),
            ]),
            Node::Block(items) | Node::Module(items) => Some(items.clone()),
            Node::Function { name, params, body } => {
                let mut children = vec![(**name).clone(), (**body).clone()];
                children.extend(params.iter().cloned());
                Some(children)
            }
        }
    }

    fn make_term(head: NodeKind, mut children: Vec<Node>) -> Node {
        let need = |want: usize, got: usize| {
            assert!(
                got >= want,
                "{head:?} takes at least {want} child(ren), got {got}"
            );
        };
        match head {
            NodeKind::Literal | NodeKind::Variable => {
                panic!("{head:?} is a leaf and cannot be rebuilt from children")
            }
            NodeKind::Call => {
                need(1, children.len());
                let args = children.split_off(1);
                Node::Call {
                    op: Box::new(children.remove(0)),
                    args,
                }
            }
            NodeKind::Load => {
                need(1, children.len());
                let index = children.split_off(1);
                Node::Load {
                    buffer: Box::new(children.remove(0)),
                    index,
                }
            }
            NodeKind::Store => {
                need(2, children.len());
                let index = children.split_off(2);
                let value = children.pop().expect("length checked");
                Node::Store {
                    buffer: Box::new(children.remove(0)),
                    value: Box::new(value),
                    index,
                }
            }
            NodeKind::Length => {
                let [inner] = unpack::<Node, 1>(head, children);
                Node::Length(Box::new(inner))
            }
            NodeKind::Shape => {
                let [inner] = unpack::<Node, 1>(head, children);
                Node::Shape(Box::new(inner))
            }
            NodeKind::Return => {
                let [inner] = unpack::<Node, 1>(head, children);
                Node::Return(Box::new(inner))
            }
            NodeKind::GetAttr => {
                let [object, attr] = unpack::<Node, 2>(head, children);
                Node::GetAttr {
                    object: Box::new(object),
                    attr: Box::new(attr),
                }
            }
            NodeKind::Assign => {
                let [lhs, rhs] = unpack::<Node, 2>(head, children);
                Node::Assign {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            NodeKind::If => {
                let [cond, body] = unpack::<Node, 2>(head, children);
                Node::If {
                    cond: Box::new(cond),
                    body: Box::new(body),
                }
            }
            NodeKind::IfElse => {
                let [cond, then_body, else_body] = unpack::<Node, 3>(head, children);
                Node::IfElse {
                    cond: Box::new(cond),
                    then_body: Box::new(then_body),
                    else_body: Box::new(else_body),
                }
            }
            NodeKind::For => {
                let [var, start, end, body] = unpack::<Node, 4>(head, children);
                Node::For {
                    var: Box::new(var),
                    start: Box::new(start),
                    end: Box::new(end),
                    body: Box::new(body),
                }
            }
            NodeKind::Block => Node::Block(children),
            NodeKind::Module => Node::Module(children),
            NodeKind::Function => {
                need(2, children.len());
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

    pub fn str_lit(value: &str) -> Node {
        Node::Literal(Const::Str(value.to_string()))
    }

    pub fn var(v: &Var) -> Node {
        Node::Variable(v.clone())
    }

    /// Built-in operator application.
    pub fn op_call(op: OpKind, args: Vec<Node>) -> Node {
        Node::Call {
            op: Box::new(Node::Literal(Const::Op(op))),
            args,
        }
    }

    pub fn load(buffer: Node, index: Vec<Node>) -> Node {
        Node::Load {
            buffer: Box::new(buffer),
            index,
        }
    }

    pub fn store(buffer: Node, index: Vec<Node>, value: Node) -> Node {
        Node::Store {
            buffer: Box::new(buffer),
            index,
            value: Box::new(value),
        }
    }

    pub fn length(buffer: Node) -> Node {
        Node::Length(Box::new(buffer))
    }

    pub fn shape(buffer: Node) -> Node {
        Node::Shape(Box::new(buffer))
    }

    pub fn get_attr(object: Node, attr: &str) -> Node {
        Node::GetAttr {
            object: Box::new(object),
            attr: Box::new(Node::str_lit(attr)),
        }
    }

    pub fn assign(lhs: &Var, rhs: Node) -> Node {
        Node::Assign {
            lhs: Box::new(Node::var(lhs)),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_(cond: Node, body: Node) -> Node {
        Node::If {
            cond: Box::new(cond),
            body: Box::new(body),
        }
    }

    pub fn if_else(cond: Node, then_body: Node, else_body: Node) -> Node {
        Node::IfElse {
            cond: Box::new(cond),
            then_body: Box::new(then_body),
            else_body: Box::new(else_body),
        }
    }

    pub fn for_(var: &Var, start: Node, end: Node, body: Node) -> Node {
        Node::For {
            var: Box::new(Node::var(var)),
            start: Box::new(start),
            end: Box::new(end),
            body: Box::new(body),
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

// ─── Static typing ─────────────────────────────────────────────────

/// Compute the FType of an expression node without evaluating it. Used by
/// the C backend to pick storage layouts and by lowering to declare
/// outputs ahead of execution.
pub fn result_ftype(node: &Node) -> Result<FType, Error> {
    match node {
        Node::Literal(Const::Int(_)) => Ok(FType::Scalar(ElemType::I64)),
        Node::Literal(Const::Float(_)) => Ok(FType::Scalar(ElemType::F64)),
        Node::Literal(Const::Bool(_)) => Ok(FType::Scalar(ElemType::Bool)),
        Node::Variable(v) => Ok(v.ftype.clone()),
        Node::Call { op, args } => {
            let Node::Literal(Const::Op(kind)) = &**op else {
                return Err(Error::mismatch("call operator is not a builtin"));
            };
            match kind {
                OpKind::Eq | OpKind::Lt => Ok(FType::Scalar(ElemType::Bool)),
                _ => {
                    // Numeric ops promote to f64 when any operand is f64.
                    let mut result = ElemType::I64;
                    for arg in args {
                        if result_ftype(arg)?.element_type()? == ElemType::F64 {
                            result = ElemType::F64;
                        }
                    }
                    Ok(FType::Scalar(result))
                }
            }
        }
        Node::Load { buffer, .. } => {
            Ok(FType::Scalar(result_ftype(buffer)?.element_type()?))
        }
        Node::Length(_) => Ok(FType::Scalar(ElemType::I64)),
        Node::Shape(buffer) => {
            let ndim = result_ftype(buffer)?.ndim();
            Ok(FType::Tuple(vec![FType::Scalar(ElemType::I64); ndim]))
        }
        Node::GetAttr { object, attr } => {
            let Node::Literal(Const::Str(name)) = &**attr else {
                return Err(Error::mismatch("attribute name is not a string literal"));
            };
            attr_ftype(&result_ftype(object)?, name)
        }
        other => Err(Error::unsupported(
            format!("{:?}", other.head()),
            "result_ftype",
        )),
    }
}

/// The FType of field `name` inside an aggregate FType.
pub fn attr_ftype(object: &FType, name: &str) -> Result<FType, Error> {
    match object {
        FType::Tuple(items) => {
            let position = tuple_position(name, items.len())?;
            Ok(items[position].clone())
        }
        FType::Record(fields) => fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ftype)| ftype.clone())
            .ok_or_else(|| Error::mismatch(format!("{object} has no field `{name}`"))),
        other => Err(Error::mismatch(format!(
            "{other} does not support attribute access"
        ))),
    }
}

/// Resolve `element_N` to a tuple position, bounds-checked.
pub fn tuple_position(name: &str, len: usize) -> Result<usize, Error> {
    let position: usize = name
        .strip_prefix("element_")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| Error::mismatch(format!("`{name}` is not a tuple field")))?;
    if position >= len {
        return Err(Error::mismatch(format!(
            "tuple of {len} element(s) has no field `{name}`"
        )));
    }
    Ok(position)
}
