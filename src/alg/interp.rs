//! Tree-walking evaluator for the expression language.

use crate::alg::Expr;
use crate::env::ScopedEnv;
use crate::error::Error;
use crate::value::{apply_op, Const, OpKind, Value};

/// Reduces expressions to scalar values under a scoped environment.
pub struct Evaluator {
    pub env: ScopedEnv<Value>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            env: ScopedEnv::new(),
        }
    }

    pub fn with_bindings(bindings: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut env = ScopedEnv::new();
        for (name, value) in bindings {
            env.define(name, value);
        }
        Self { env }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Literal(value) => Ok(Value::from_const(value)),
            Expr::Variable(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnboundVariable(name.clone())),
            Expr::Add(l, r) => apply_op(OpKind::Add, &[self.eval(l)?, self.eval(r)?]),
            Expr::Sub(l, r) => apply_op(OpKind::Sub, &[self.eval(l)?, self.eval(r)?]),
            Expr::Mul(l, r) => apply_op(OpKind::Mul, &[self.eval(l)?, self.eval(r)?]),
            Expr::Pow(base, exponent) => {
                let base = self.eval(base)?;
                let exponent = self.eval(exponent)?;
                pow_value(&base, &exponent)
            }
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn pow_value(base: &Value, exponent: &Value) -> Result<Value, Error> {
    let as_const = |v: &Value| -> Result<Const, Error> {
        match v {
            Value::Int(i) => Ok(Const::Int(*i)),
            Value::Float(f) => Ok(Const::Float(*f)),
            other => Err(Error::mismatch(format!(
                "operator `pow` expects numbers, got {}",
                other.type_name()
            ))),
        }
    };
    let result = as_const(base)?
        .pow(&as_const(exponent)?)
        .expect("both operands are numeric");
    Ok(Value::from_const(&result))
}
