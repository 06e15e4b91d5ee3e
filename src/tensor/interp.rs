//! Direct interpreter for the array language: whole-array operations on
//! buffers, no lowering.

use std::collections::HashMap;

use crate::buffer::{BufData, NdBuffer};
use crate::env::ScopedEnv;
use crate::error::Error;
use crate::ftype::{FType, FTyped};
use crate::imp::Var;
use crate::tensor::{Node, TensorOp};
use crate::term::Term;
use crate::value::Value;

/// Loads array-language modules for direct execution.
pub struct TensorInterpreter;

impl TensorInterpreter {
    pub fn load(&self, module: &Node) -> Result<TensorModule, Error> {
        let Node::Module(items) = module else {
            return Err(Error::unsupported(
                format!("{:?}", module.head()),
                "tensor module loading",
            ));
        };
        let mut functions = HashMap::new();
        for item in items {
            let Node::Function { name, params, body } = item else {
                return Err(Error::unsupported(
                    format!("{:?}", item.head()),
                    "tensor module loading",
                ));
            };
            let Node::Variable(name) = &**name else {
                return Err(Error::mismatch("function name must be a variable"));
            };
            let params = params
                .iter()
                .map(|p| match p {
                    Node::Variable(v) => Ok(v.clone()),
                    other => Err(Error::unsupported(
                        format!("{:?}", other.head()),
                        "tensor function parameters",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;
            functions.insert(
                name.name.clone(),
                TensorFnDef {
                    params,
                    return_ftype: name.ftype.clone(),
                    body: (**body).clone(),
                },
            );
        }
        Ok(TensorModule { functions })
    }
}

struct TensorFnDef {
    params: Vec<Var>,
    return_ftype: FType,
    body: Node,
}

pub struct TensorModule {
    functions: HashMap<String, TensorFnDef>,
}

impl TensorModule {
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let def = self
            .functions
            .get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_string()))?;
        if args.len() != def.params.len() {
            return Err(Error::Arity {
                name: name.to_string(),
                expected: def.params.len(),
                got: args.len(),
            });
        }
        let mut env = ScopedEnv::new();
        for (param, arg) in def.params.iter().zip(args) {
            let actual = arg.ftype()?;
            if actual != param.ftype {
                return Err(Error::mismatch(format!(
                    "parameter `{}` of `{name}` is declared {}, got {actual}",
                    param.name, param.ftype
                )));
            }
            env.define(param.name.clone(), arg.clone());
        }
        let result = exec(&mut env, &def.body)?
            .ok_or_else(|| Error::mismatch(format!("`{name}` finished without returning")))?;
        let actual = result.ftype()?;
        if actual != def.return_ftype {
            return Err(Error::mismatch(format!(
                "`{name}` is declared to return {}, got {actual}",
                def.return_ftype
            )));
        }
        Ok(result)
    }
}

/// Execute a statement; `Some(value)` is an unwinding return.
fn exec(env: &mut ScopedEnv<Value>, node: &Node) -> Result<Option<Value>, Error> {
    match node {
        Node::Block(stmts) => {
            env.push_frame();
            let mut result = Ok(None);
            for stmt in stmts {
                match exec(env, stmt) {
                    Ok(None) => continue,
                    other => {
                        result = other;
                        break;
                    }
                }
            }
            env.pop_frame();
            result
        }
        Node::Assign { lhs, rhs } => {
            let Node::Variable(var) = &**lhs else {
                return Err(Error::mismatch("assignment target must be a variable"));
            };
            let value = eval(env, rhs)?;
            let actual = value.ftype()?;
            if actual != var.ftype {
                return Err(Error::mismatch(format!(
                    "variable `{}` is declared {}, got {actual}",
                    var.name, var.ftype
                )));
            }
            env.assign(&var.name, value);
            Ok(None)
        }
        Node::Return(value) => Ok(Some(eval(env, value)?)),
        other => Err(Error::unsupported(
            format!("{:?}", other.head()),
            "tensor statement execution",
        )),
    }
}

fn eval(env: &mut ScopedEnv<Value>, node: &Node) -> Result<Value, Error> {
    match node {
        Node::Literal(value) => Ok(Value::from_const(value)),
        Node::Variable(var) => env
            .get(&var.name)
            .cloned()
            .ok_or_else(|| Error::UnboundVariable(var.name.clone())),
        Node::Call { op, args } => {
            let args = args
                .iter()
                .map(|arg| eval(env, arg))
                .collect::<Result<Vec<_>, _>>()?;
            apply_tensor_op(*op, &args)
        }
        other => Err(Error::unsupported(
            format!("{:?}", other.head()),
            "tensor expression evaluation",
        )),
    }
}

fn apply_tensor_op(op: TensorOp, args: &[Value]) -> Result<Value, Error> {
    match op {
        TensorOp::MkArray => {
            let float = args.iter().any(|v| matches!(v, Value::Float(_)));
            if float {
                let data = args
                    .iter()
                    .map(|v| match v {
                        Value::Float(x) => Ok(*x),
                        Value::Int(x) => Ok(*x as f64),
                        other => Err(Error::mismatch(format!(
                            "mkarray takes scalars, got {}",
                            other.type_name()
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let len = data.len();
                Ok(Value::buffer(NdBuffer::from_f64(data, vec![len])?))
            } else {
                let data = args
                    .iter()
                    .map(|v| match v {
                        Value::Int(x) => Ok(*x),
                        other => Err(Error::mismatch(format!(
                            "mkarray takes scalars, got {}",
                            other.type_name()
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let len = data.len();
                Ok(Value::buffer(NdBuffer::from_i64(data, vec![len])?))
            }
        }
        TensorOp::Neg => {
            let [buf] = buffer_args::<1>(op, args)?;
            let out = match buf.data() {
                BufData::I64(v) => {
                    NdBuffer::from_i64(v.iter().map(|x| x.wrapping_neg()).collect(), buf.shape().to_vec())?
                }
                BufData::F64(v) => {
                    NdBuffer::from_f64(v.iter().map(|x| -x).collect(), buf.shape().to_vec())?
                }
            };
            Ok(Value::buffer(out))
        }
        TensorOp::Add | TensorOp::Sub => {
            let [lhs, rhs] = buffer_args::<2>(op, args)?;
            if lhs.shape() != rhs.shape() || lhs.elem_type() != rhs.elem_type() {
                return Err(Error::mismatch(format!(
                    "{op} takes buffers of matching shape and element type, got {} {:?} and {} {:?}",
                    lhs.ftype(),
                    lhs.shape(),
                    rhs.ftype(),
                    rhs.shape()
                )));
            }
            let out = match (lhs.data(), rhs.data()) {
                (BufData::I64(a), BufData::I64(b)) => NdBuffer::from_i64(
                    a.iter()
                        .zip(b)
                        .map(|(x, y)| {
                            if op == TensorOp::Add {
                                x.wrapping_add(*y)
                            } else {
                                x.wrapping_sub(*y)
                            }
                        })
                        .collect(),
                    lhs.shape().to_vec(),
                )?,
                (BufData::F64(a), BufData::F64(b)) => NdBuffer::from_f64(
                    a.iter()
                        .zip(b)
                        .map(|(x, y)| if op == TensorOp::Add { x + y } else { x - y })
                        .collect(),
                    lhs.shape().to_vec(),
                )?,
                _ => unreachable!("element types checked above"),
            };
            Ok(Value::buffer(out))
        }
    }
}

fn buffer_args<const N: usize>(op: TensorOp, args: &[Value]) -> Result<[NdBuffer; N], Error> {
    if args.len() != N {
        return Err(Error::Arity {
            name: op.as_str().to_string(),
            expected: N,
            got: args.len(),
        });
    }
    let buffers: Vec<NdBuffer> = args
        .iter()
        .map(|arg| match arg {
            Value::Buffer(cell) => Ok(cell.borrow().clone()),
            other => Err(Error::mismatch(format!(
                "{op} takes buffers, got {}",
                other.type_name()
            ))),
        })
        .collect::<Result<_, Error>>()?;
    Ok(<[NdBuffer; N]>::try_from(buffers).expect("length checked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftype::ElemType;

    fn unwrap_buffer(value: Value) -> NdBuffer {
        match value {
            Value::Buffer(cell) => cell.borrow().clone(),
            other => panic!("expected a buffer, got {other:?}"),
        }
    }

    #[test]
    fn test_mkarray_builds_rank_one_buffer() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let f = Var::tensor("mk", ElemType::I64, 1);
        let module = Node::module(vec![Node::function(
            f,
            vec![],
            Node::block(vec![
                Node::assign(
                    &a,
                    Node::call(TensorOp::MkArray, vec![Node::int(1), Node::int(2), Node::int(3)]),
                ),
                Node::ret(Node::var(&a)),
            ]),
        )]);
        let module = TensorInterpreter.load(&module).unwrap();
        let out = unwrap_buffer(module.call("mk", &[]).unwrap());
        assert_eq!(out, NdBuffer::from_i64(vec![1, 2, 3], vec![3]).unwrap());
    }

    #[test]
    fn test_neg_elementwise() {
        let input = NdBuffer::from_i64(vec![1, -2, 3], vec![3]).unwrap();
        let out = apply_tensor_op(TensorOp::Neg, &[Value::buffer(input)]).unwrap();
        assert_eq!(
            unwrap_buffer(out),
            NdBuffer::from_i64(vec![-1, 2, -3], vec![3]).unwrap()
        );
    }

    #[test]
    fn test_add_requires_matching_shapes() {
        let a = Value::buffer(NdBuffer::from_i64(vec![1, 2], vec![2]).unwrap());
        let b = Value::buffer(NdBuffer::from_i64(vec![1, 2, 3], vec![3]).unwrap());
        assert!(matches!(
            apply_tensor_op(TensorOp::Add, &[a, b]).unwrap_err(),
            Error::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_two_dimensional_add() {
        let a = Value::buffer(NdBuffer::from_i64(vec![1, 2, 3, 4], vec![2, 2]).unwrap());
        let b = Value::buffer(NdBuffer::from_i64(vec![5, 6, 7, 8], vec![2, 2]).unwrap());
        let out = apply_tensor_op(TensorOp::Add, &[a, b]).unwrap();
        assert_eq!(
            unwrap_buffer(out),
            NdBuffer::from_i64(vec![6, 8, 10, 12], vec![2, 2]).unwrap()
        );
    }
}
