//! skiff: a workbench for building small array compilers.
//!
//! The core is a generic term model with strategy-based rewriting, a
//! functorial type system, and a scoped environment; on top of it sit an
//! arithmetic expression language (parse, evaluate, normalize), a
//! buffer-level imperative IR, and an array language that lowers onto the
//! IR. The IR executes through two interchangeable backends, a
//! tree-walking interpreter and a C-emitting compiler that builds and
//! loads a shared object, which must agree on every program.

pub mod alg;
pub mod backend;
pub mod buffer;
pub mod codegen;
pub mod diagnostic;
pub mod env;
pub mod error;
pub mod ftype;
pub mod imp;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod tensor;
pub mod term;
pub mod token;
pub mod value;

pub use backend::{Backend, Program};
pub use buffer::NdBuffer;
pub use env::ScopedEnv;
pub use error::Error;
pub use ftype::{ftype_of, register, ElemType, FType, FTyped};
pub use parser::parse_expr;
pub use term::rewrite::{Chain, Fixpoint, PostWalk, Rewrite, Strategy};
pub use term::Term;
pub use value::{element_type, shape_type, Const, OpKind, Value};
