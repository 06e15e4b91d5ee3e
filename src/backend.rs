//! The dual-backend execution contract.
//!
//! Both the tree-walking interpreter and the C compiler implement
//! [`Backend`]: they consume the same imperative IR module and hand back a
//! [`Program`] exposing one callable per function definition. For any
//! well-typed module and inputs satisfying the declared parameter FTypes,
//! every backend must produce identical results; the test suite enforces
//! this pairwise.

use crate::error::Error;
use crate::imp::Node;
use crate::value::Value;

/// A loaded module: call any of its functions by name.
pub trait Program {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error>;
}

/// Turns an IR module into a runnable program.
pub trait Backend {
    fn compile(&self, module: &Node) -> Result<Box<dyn Program>, Error>;
}
