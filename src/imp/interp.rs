//! Tree-walking backend for the imperative IR.
//!
//! Strict, call-by-value reduction: every expression reduces its children
//! first, except control constructs, which evaluate only the branch or
//! iterations actually taken. `Return` unwinds to the enclosing function
//! boundary through the [`Flow`] result. Blocks run in their own frame
//! and loops re-enter a fresh frame per iteration, so body-local bindings
//! do not leak across iterations unless bound outside the loop.

use std::collections::HashMap;

use crate::backend::{Backend, Program};
use crate::env::ScopedEnv;
use crate::error::Error;
use crate::ftype::FType;
use crate::imp::{tuple_position, Node, Var};
use crate::term::Term;
use crate::value::{apply_op, Const, Value};

/// Statement outcome: fall through, or unwind with a return value.
enum Flow {
    Normal,
    Return(Value),
}

/// The tree-walking backend.
pub struct Interpreter;

impl Backend for Interpreter {
    fn compile(&self, module: &Node) -> Result<Box<dyn Program>, Error> {
        Ok(Box::new(InterpretedModule::load(module)?))
    }
}

/// One function definition, indexed for calling.
struct FnDef {
    params: Vec<Var>,
    return_ftype: FType,
    body: Node,
}

/// A module "loaded" for interpretation: its function definitions.
pub struct InterpretedModule {
    functions: HashMap<String, FnDef>,
}

impl InterpretedModule {
    pub fn load(module: &Node) -> Result<Self, Error> {
        let Node::Module(items) = module else {
            return Err(Error::unsupported(
                format!("{:?}", module.head()),
                "module loading",
            ));
        };
        let mut functions = HashMap::new();
        for item in items {
            let Node::Function { name, params, body } = item else {
                return Err(Error::unsupported(
                    format!("{:?}", item.head()),
                    "module loading",
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
                        "function parameters",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;
            functions.insert(
                name.name.clone(),
                FnDef {
                    params,
                    return_ftype: name.ftype.clone(),
                    body: (**body).clone(),
                },
            );
        }
        Ok(Self { functions })
    }
}

impl Program for InterpretedModule {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
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

        let mut machine = Machine::new();
        for (param, arg) in def.params.iter().zip(args) {
            let actual = arg.ftype()?;
            if actual != param.ftype {
                return Err(Error::mismatch(format!(
                    "parameter `{}` of `{name}` is declared {}, got {actual}",
                    param.name, param.ftype
                )));
            }
            machine.env.define(param.name.clone(), arg.clone());
        }

        match machine.exec(&def.body)? {
            Flow::Return(value) => {
                let actual = value.ftype()?;
                if actual != def.return_ftype {
                    return Err(Error::mismatch(format!(
                        "`{name}` is declared to return {}, got {actual}",
                        def.return_ftype
                    )));
                }
                Ok(value)
            }
            Flow::Normal => Err(Error::mismatch(format!(
                "`{name}` finished without returning a value"
            ))),
        }
    }
}

/// Evaluator state: the scoped environment.
struct Machine {
    env: ScopedEnv<Value>,
}

impl Machine {
    fn new() -> Self {
        Self {
            env: ScopedEnv::new(),
        }
    }

    /// Execute a statement node.
    fn exec(&mut self, node: &Node) -> Result<Flow, Error> {
        match node {
            Node::Block(stmts) => {
                self.env.push_frame();
                let result = self.exec_all(stmts);
                self.env.pop_frame();
                result
            }
            Node::Assign { lhs, rhs } => {
                let Node::Variable(var) = &**lhs else {
                    return Err(Error::mismatch("assignment target must be a variable"));
                };
                let value = self.eval(rhs)?;
                let actual = value.ftype()?;
                if actual != var.ftype {
                    return Err(Error::mismatch(format!(
                        "variable `{}` is declared {}, got {actual}",
                        var.name, var.ftype
                    )));
                }
                self.env.assign(&var.name, value);
                Ok(Flow::Normal)
            }
            Node::Store {
                buffer,
                index,
                value,
            } => {
                let target = self.eval_buffer(buffer)?;
                let index = self.eval_index(index)?;
                let value = self.eval(value)?;
                target.borrow_mut().set(&index, &value)?;
                Ok(Flow::Normal)
            }
            Node::If { cond, body } => {
                if self.eval(cond)?.as_bool()? {
                    return self.exec(body);
                }
                Ok(Flow::Normal)
            }
            Node::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                // Only the taken branch is evaluated.
                if self.eval(cond)?.as_bool()? {
                    self.exec(then_body)
                } else {
                    self.exec(else_body)
                }
            }
            Node::For {
                var,
                start,
                end,
                body,
            } => {
                let Node::Variable(var) = &**var else {
                    return Err(Error::mismatch("loop variable must be a variable"));
                };
                let start = self.eval_int(start)?;
                let end = self.eval_int(end)?;
                for i in start..end {
                    // Fresh frame per iteration; the counter lives in it.
                    self.env.push_frame();
                    self.env.define(var.name.clone(), Value::Int(i));
                    let flow = self.exec(body);
                    self.env.pop_frame();
                    if let Flow::Return(value) = flow? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Node::Return(value) => Ok(Flow::Return(self.eval(value)?)),
            other => Err(Error::unsupported(
                format!("{:?}", other.head()),
                "statement execution",
            )),
        }
    }

    fn exec_all(&mut self, stmts: &[Node]) -> Result<Flow, Error> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    /// Reduce an expression node to a value.
    fn eval(&mut self, node: &Node) -> Result<Value, Error> {
        match node {
            Node::Literal(value) => Ok(Value::from_const(value)),
            Node::Variable(var) => {
                let value = self
                    .env
                    .get(&var.name)
                    .cloned()
                    .ok_or_else(|| Error::UnboundVariable(var.name.clone()))?;
                let actual = value.ftype()?;
                if actual != var.ftype {
                    return Err(Error::mismatch(format!(
                        "variable `{}` is declared {}, but holds {actual}",
                        var.name, var.ftype
                    )));
                }
                Ok(value)
            }
            Node::Call { op, args } => {
                let op = self.eval(op)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                match op {
                    Value::Op(kind) => apply_op(kind, &args),
                    other => Err(Error::mismatch(format!(
                        "{} is not callable",
                        other.type_name()
                    ))),
                }
            }
            Node::Load { buffer, index } => {
                let source = self.eval_buffer(buffer)?;
                let index = self.eval_index(index)?;
                let value = source.borrow().get(&index)?;
                Ok(value)
            }
            Node::Length(buffer) => {
                let source = self.eval_buffer(buffer)?;
                let len = source.borrow().len() as i64;
                Ok(Value::Int(len))
            }
            Node::Shape(buffer) => {
                let source = self.eval_buffer(buffer)?;
                let extents = source
                    .borrow()
                    .shape()
                    .iter()
                    .map(|extent| Value::Int(*extent as i64))
                    .collect();
                Ok(Value::Tuple(extents))
            }
            Node::GetAttr { object, attr } => {
                let Node::Literal(Const::Str(name)) = &**attr else {
                    return Err(Error::mismatch("attribute name is not a string literal"));
                };
                match self.eval(object)? {
                    Value::Tuple(items) => {
                        let position = tuple_position(name, items.len())?;
                        Ok(items[position].clone())
                    }
                    Value::Record(fields) => fields
                        .iter()
                        .find(|(field, _)| field == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| {
                            Error::mismatch(format!("record has no field `{name}`"))
                        }),
                    other => Err(Error::mismatch(format!(
                        "{} does not support attribute access",
                        other.type_name()
                    ))),
                }
            }
            other => Err(Error::unsupported(
                format!("{:?}", other.head()),
                "expression evaluation",
            )),
        }
    }

    fn eval_buffer(
        &mut self,
        node: &Node,
    ) -> Result<std::rc::Rc<std::cell::RefCell<crate::buffer::NdBuffer>>, Error> {
        match self.eval(node)? {
            Value::Buffer(buffer) => Ok(buffer),
            other => Err(Error::mismatch(format!(
                "expected a buffer, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_int(&mut self, node: &Node) -> Result<i64, Error> {
        match self.eval(node)? {
            Value::Int(v) => Ok(v),
            other => Err(Error::mismatch(format!(
                "expected an i64 bound, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_index(&mut self, index: &[Node]) -> Result<Vec<usize>, Error> {
        index
            .iter()
            .map(|i| self.eval(i)?.as_index())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftype::ElemType;
    use crate::value::OpKind;

    fn run(module: &Node, name: &str, args: &[Value]) -> Result<Value, Error> {
        Interpreter.compile(module)?.call(name, args)
    }

    #[test]
    fn test_return_unwinds_early() {
        let f = Var::scalar("f", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
            vec![],
            Node::block(vec![
                Node::ret(Node::int(1)),
                Node::ret(Node::int(2)),
            ]),
        )]);
        assert_eq!(run(&module, "f", &[]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_condition_must_be_bool() {
        let f = Var::scalar("f", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
            vec![],
            Node::block(vec![
                Node::if_(Node::int(1), Node::block(vec![])),
                Node::ret(Node::int(0)),
            ]),
        )]);
        assert!(matches!(
            run(&module, "f", &[]).unwrap_err(),
            Error::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_loop_locals_do_not_leak() {
        // t is bound only inside the loop body; reading it after the loop
        // must fail even though the loop ran.
        let f = Var::scalar("f", ElemType::I64);
        let i = Var::scalar("i", ElemType::I64);
        let t = Var::scalar("t", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
            vec![],
            Node::block(vec![
                Node::for_(
                    &i,
                    Node::int(0),
                    Node::int(2),
                    Node::block(vec![Node::assign(&t, Node::var(&i))]),
                ),
                Node::ret(Node::var(&t)),
            ]),
        )]);
        assert!(matches!(
            run(&module, "f", &[]).unwrap_err(),
            Error::UnboundVariable(name) if name == "t"
        ));
    }

    #[test]
    fn test_accumulator_bound_outside_loop_survives() {
        let f = Var::scalar("f", ElemType::I64);
        let i = Var::scalar("i", ElemType::I64);
        let acc = Var::scalar("acc", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
            vec![],
            Node::block(vec![
                Node::assign(&acc, Node::int(0)),
                Node::for_(
                    &i,
                    Node::int(0),
                    Node::int(4),
                    Node::block(vec![Node::assign(
                        &acc,
                        Node::op_call(OpKind::Add, vec![Node::var(&acc), Node::var(&i)]),
                    )]),
                ),
                Node::ret(Node::var(&acc)),
            ]),
        )]);
        assert_eq!(run(&module, "f", &[]).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_declared_type_checked_at_assignment() {
        let f = Var::scalar("f", ElemType::I64);
        let x = Var::scalar("x", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
            vec![],
            Node::block(vec![
                Node::assign(&x, Node::float(1.5)),
                Node::ret(Node::var(&x)),
            ]),
        )]);
        assert!(matches!(
            run(&module, "f", &[]).unwrap_err(),
            Error::TypeMismatch(_)
        ));
    }

    #[test]
    fn test_arity_checked() {
        let f = Var::scalar("f", ElemType::I64);
        let x = Var::scalar("x", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
            vec![x.clone()],
            Node::block(vec![Node::ret(Node::var(&x))]),
        )]);
        assert!(matches!(
            run(&module, "f", &[]).unwrap_err(),
            Error::Arity { .. }
        ));
    }
}
