//! The functorial type system.
//!
//! An [`FType`] describes the shape of a runtime value well enough for the
//! backends to validate operands, pick a C storage layout, and compute the
//! type of a composite expression without evaluating it. Values either
//! expose their own descriptor (the [`FTyped`] trait) or, for foreign
//! representations, are looked up in the process-wide [`registry`].

pub mod registry;

pub use registry::{ftype_of, register};

use std::fmt;

use crate::error::Error;

/// Scalar element and index types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElemType {
    I64,
    F64,
    Bool,
}

impl ElemType {
    /// The C spelling of this scalar. Booleans travel as `int64_t` so that
    /// every member of a marshalled aggregate is one 8-byte word.
    pub fn c_name(&self) -> &'static str {
        match self {
            ElemType::I64 | ElemType::Bool => "int64_t",
            ElemType::F64 => "double",
        }
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElemType::I64 => "i64",
            ElemType::F64 => "f64",
            ElemType::Bool => "bool",
        };
        write!(f, "{name}")
    }
}

/// Functorial type descriptor.
///
/// For tensors, `shape` holds one *index type* per axis, so
/// `ndim == shape.len()`; the extents themselves are runtime data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FType {
    Scalar(ElemType),
    Tensor { elem: ElemType, shape: Vec<ElemType> },
    Tuple(Vec<FType>),
    Record(Vec<(String, FType)>),
}

impl FType {
    /// A rank-`ndim` tensor whose axes are indexed by `i64`.
    pub fn tensor(elem: ElemType, ndim: usize) -> Self {
        FType::Tensor {
            elem,
            shape: vec![ElemType::I64; ndim],
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            FType::Tensor { shape, .. } => shape.len(),
            _ => 0,
        }
    }

    pub fn element_type(&self) -> Result<ElemType, Error> {
        match self {
            FType::Scalar(elem) | FType::Tensor { elem, .. } => Ok(*elem),
            other => Err(Error::mismatch(format!(
                "{other} has no element type"
            ))),
        }
    }

    pub fn shape_type(&self) -> Result<&[ElemType], Error> {
        match self {
            FType::Tensor { shape, .. } => Ok(shape),
            other => Err(Error::mismatch(format!("{other} has no shape type"))),
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, FType::Tensor { .. })
    }
}

impl fmt::Display for FType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FType::Scalar(elem) => write!(f, "{elem}"),
            FType::Tensor { elem, shape } => write!(f, "buf<{elem}, {}>", shape.len()),
            FType::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            FType::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, item)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Implemented by value representations that carry their own descriptor.
pub trait FTyped {
    fn ftype(&self) -> FType;
}
