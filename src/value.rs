//! Literal constants and runtime values.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::buffer::NdBuffer;
use crate::error::Error;
use crate::ftype::{ElemType, FType, FTyped};

/// Built-in scalar operators usable as `Call` operands in the imperative IR.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Neg,
    Eq,
    Lt,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Neg => "neg",
            OpKind::Eq => "eq",
            OpKind::Lt => "lt",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            OpKind::Neg => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A literal payload embedded in a term.
///
/// Floats compare and hash by bit pattern so that terms stay lawful
/// `Eq + Hash` citizens; `Int(2)` and `Float(2.0)` are distinct constants.
#[derive(Clone, Debug)]
pub enum Const {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Op(OpKind),
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::Int(a), Const::Int(b)) => a == b,
            (Const::Float(a), Const::Float(b)) => a.to_bits() == b.to_bits(),
            (Const::Bool(a), Const::Bool(b)) => a == b,
            (Const::Str(a), Const::Str(b)) => a == b,
            (Const::Op(a), Const::Op(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Const {}

impl Hash for Const {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Const::Int(v) => v.hash(state),
            Const::Float(v) => v.to_bits().hash(state),
            Const::Bool(v) => v.hash(state),
            Const::Str(v) => v.hash(state),
            Const::Op(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{v}"),
            // Debug formatting keeps a trailing ".0", so floats survive a
            // print/parse round trip as floats.
            Const::Float(v) => write!(f, "{v:?}"),
            Const::Bool(v) => write!(f, "{v}"),
            Const::Str(v) => write!(f, "{v:?}"),
            Const::Op(v) => write!(f, "{v}"),
        }
    }
}

impl Const {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Const::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Const::Int(_) | Const::Float(_))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Const::Int(0)) || matches!(self, Const::Float(v) if *v == 0.0)
    }

    /// Numeric addition with int-to-float promotion; `None` on non-numbers.
    pub fn add(&self, other: &Const) -> Option<Const> {
        match (self, other) {
            (Const::Int(a), Const::Int(b)) => Some(Const::Int(a.wrapping_add(*b))),
            (a, b) => Some(Const::Float(a.as_f64()? + b.as_f64()?)),
        }
    }

    pub fn mul(&self, other: &Const) -> Option<Const> {
        match (self, other) {
            (Const::Int(a), Const::Int(b)) => Some(Const::Int(a.wrapping_mul(*b))),
            (a, b) => Some(Const::Float(a.as_f64()? * b.as_f64()?)),
        }
    }

    /// Exponentiation: integer base and non-negative integer exponent stay
    /// integral, everything else goes through `f64::powf`.
    pub fn pow(&self, other: &Const) -> Option<Const> {
        match (self, other) {
            (Const::Int(base), Const::Int(exp)) if *exp >= 0 && *exp <= u32::MAX as i64 => {
                Some(Const::Int(base.wrapping_pow(*exp as u32)))
            }
            (a, b) => Some(Const::Float(a.as_f64()?.powf(b.as_f64()?))),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Const::Int(v) => Some(*v as f64),
            Const::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A runtime value produced by the interpreters.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Tuple(Vec<Value>),
    Record(Vec<(String, Value)>),
    Buffer(Rc<RefCell<NdBuffer>>),
    Op(OpKind),
}

impl Value {
    pub fn from_const(c: &Const) -> Value {
        match c {
            Const::Int(v) => Value::Int(*v),
            Const::Float(v) => Value::Float(*v),
            Const::Bool(v) => Value::Bool(*v),
            Const::Str(v) => Value::Str(v.clone()),
            Const::Op(v) => Value::Op(*v),
        }
    }

    pub fn buffer(buf: NdBuffer) -> Value {
        Value::Buffer(Rc::new(RefCell::new(buf)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "i64",
            Value::Float(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::Record(_) => "record",
            Value::Buffer(_) => "buffer",
            Value::Op(_) => "operator",
        }
    }

    pub fn as_index(&self) -> Result<usize, Error> {
        match self {
            Value::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(Error::mismatch(format!(
                "expected a non-negative i64 index, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(Error::mismatch(format!(
                "condition must be bool, got {}",
                other.type_name()
            ))),
        }
    }

    /// The FType of this value. Operators and strings are not first-class
    /// typed values; asking for their FType is an error.
    pub fn ftype(&self) -> Result<FType, Error> {
        match self {
            Value::Int(_) => Ok(FType::Scalar(ElemType::I64)),
            Value::Float(_) => Ok(FType::Scalar(ElemType::F64)),
            Value::Bool(_) => Ok(FType::Scalar(ElemType::Bool)),
            Value::Tuple(items) => Ok(FType::Tuple(
                items.iter().map(Value::ftype).collect::<Result<_, _>>()?,
            )),
            Value::Record(fields) => Ok(FType::Record(
                fields
                    .iter()
                    .map(|(name, v)| Ok((name.clone(), v.ftype()?)))
                    .collect::<Result<_, Error>>()?,
            )),
            Value::Buffer(buf) => Ok(buf.borrow().ftype()),
            Value::Str(_) => Err(Error::UnknownFType("str".to_string())),
            Value::Op(_) => Err(Error::UnknownFType("operator".to_string())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Buffer(a), Value::Buffer(b)) => *a.borrow() == *b.borrow(),
            (Value::Op(a), Value::Op(b)) => a == b,
            _ => false,
        }
    }
}

/// The element type of a value. Buffers answer directly from their own
/// descriptor; everything else goes through [`Value::ftype`].
pub fn element_type(value: &Value) -> Result<ElemType, Error> {
    match value {
        Value::Buffer(cell) => Ok(cell.borrow().elem_type()),
        other => other.ftype()?.element_type(),
    }
}

/// The shape type of a value: one index type per axis.
pub fn shape_type(value: &Value) -> Result<Vec<ElemType>, Error> {
    match value {
        Value::Buffer(cell) => Ok(vec![ElemType::I64; cell.borrow().ndim()]),
        other => Ok(other.ftype()?.shape_type()?.to_vec()),
    }
}

/// Apply a built-in operator to evaluated arguments. Integer arithmetic
/// wraps (two's complement), matching the behavior of the generated C.
pub fn apply_op(op: OpKind, args: &[Value]) -> Result<Value, Error> {
    if args.len() != op.arity() {
        return Err(Error::Arity {
            name: op.as_str().to_string(),
            expected: op.arity(),
            got: args.len(),
        });
    }
    let numeric = |v: &Value| -> Result<f64, Error> {
        match v {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(Error::mismatch(format!(
                "operator `{op}` expects numbers, got {}",
                other.type_name()
            ))),
        }
    };
    let both_int = |a: &Value, b: &Value| matches!((a, b), (Value::Int(_), Value::Int(_)));

    match op {
        OpKind::Neg => match &args[0] {
            Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => Err(Error::mismatch(format!(
                "operator `neg` expects a number, got {}",
                other.type_name()
            ))),
        },
        OpKind::Add | OpKind::Sub | OpKind::Mul => {
            let (a, b) = (&args[0], &args[1]);
            if both_int(a, b) {
                let (Value::Int(x), Value::Int(y)) = (a, b) else {
                    unreachable!("guarded by both_int");
                };
                Ok(Value::Int(match op {
                    OpKind::Add => x.wrapping_add(*y),
                    OpKind::Sub => x.wrapping_sub(*y),
                    _ => x.wrapping_mul(*y),
                }))
            } else {
                let (x, y) = (numeric(a)?, numeric(b)?);
                Ok(Value::Float(match op {
                    OpKind::Add => x + y,
                    OpKind::Sub => x - y,
                    _ => x * y,
                }))
            }
        }
        OpKind::Eq | OpKind::Lt => {
            let (a, b) = (&args[0], &args[1]);
            if both_int(a, b) {
                let (Value::Int(x), Value::Int(y)) = (a, b) else {
                    unreachable!("guarded by both_int");
                };
                Ok(Value::Bool(if op == OpKind::Eq { x == y } else { x < y }))
            } else {
                let (x, y) = (numeric(a)?, numeric(b)?);
                Ok(Value::Bool(if op == OpKind::Eq { x == y } else { x < y }))
            }
        }
    }
}
