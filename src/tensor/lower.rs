//! Lowering the array language onto the imperative IR.
//!
//! Every buffer an array function produces becomes an out-parameter of
//! the lowered function: whole-array operations turn into loops that
//! store into it, and the function returns the out-parameter. The caller
//! allocates outputs ahead of the call from the operations' result
//! FTypes; the allocation plan travels with the lowered module so both
//! imperative backends behave identically.

use std::collections::HashMap;

use crate::backend::{Backend, Program};
use crate::buffer::NdBuffer;
use crate::error::Error;
use crate::ftype::{ElemType, FType};
use crate::imp;
use crate::imp::Var;
use crate::tensor::{result_ftype, simplify, Node, TensorOp};
use crate::term::Term;
use crate::value::{OpKind, Value};

/// Where an output buffer's extents come from at call time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeSrc {
    /// Same extents as a (buffer) parameter of the function.
    OfParam(String),
    /// Extents known at lowering time.
    Fixed(Vec<usize>),
}

/// One output buffer appended to the lowered parameter list.
#[derive(Clone, Debug)]
pub struct OutSpec {
    pub name: String,
    pub elem: ElemType,
    pub ndim: usize,
    pub shape: ShapeSrc,
}

/// Allocation plan for one lowered function.
#[derive(Clone, Debug)]
pub struct FnPlan {
    /// Original parameter names, in order.
    pub params: Vec<String>,
    /// Outputs to allocate and append, in order.
    pub outs: Vec<OutSpec>,
}

#[derive(Debug)]
pub struct LoweredModule {
    pub module: imp::Node,
    pub plans: HashMap<String, FnPlan>,
}

pub fn lower(module: &Node) -> Result<LoweredModule, Error> {
    let Node::Module(items) = module else {
        return Err(Error::unsupported(
            format!("{:?}", module.head()),
            "tensor lowering",
        ));
    };
    let mut functions = Vec::new();
    let mut plans = HashMap::new();
    for item in items {
        let (function, name, plan) = lower_function(item)?;
        functions.push(function);
        plans.insert(name, plan);
    }
    Ok(LoweredModule {
        module: imp::Node::module(functions),
        plans,
    })
}

fn lower_function(node: &Node) -> Result<(imp::Node, String, FnPlan), Error> {
    let Node::Function { name, params, body } = node else {
        return Err(Error::unsupported(
            format!("{:?}", node.head()),
            "tensor lowering",
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
        .collect::<Result<Vec<Var>, _>>()?;

    let mut lowering = FnLowering::new(&params);
    lowering.lower_stmt(body, &name.ftype)?;

    let mut all_params = params.clone();
    for out in &lowering.outs {
        all_params.push(Var::tensor(out.name.clone(), out.elem, out.ndim));
    }
    let function = imp::Node::function(
        name.clone(),
        all_params,
        imp::Node::block(lowering.stmts),
    );
    let plan = FnPlan {
        params: params.into_iter().map(|p| p.name).collect(),
        outs: lowering.outs,
    };
    Ok((function, name.name.clone(), plan))
}

struct FnLowering {
    stmts: Vec<imp::Node>,
    outs: Vec<OutSpec>,
    /// Buffer name → where its extents come from.
    shape_sources: HashMap<String, ShapeSrc>,
    /// Buffer name → the variable it is a plain alias of (`b = a`).
    aliases: HashMap<String, Var>,
    temp_counter: usize,
}

impl FnLowering {
    fn new(params: &[Var]) -> Self {
        let mut shape_sources = HashMap::new();
        for param in params {
            if param.ftype.is_tensor() {
                shape_sources.insert(param.name.clone(), ShapeSrc::OfParam(param.name.clone()));
            }
        }
        Self {
            stmts: Vec::new(),
            outs: Vec::new(),
            shape_sources,
            aliases: HashMap::new(),
            temp_counter: 0,
        }
    }

    fn lower_stmt(&mut self, node: &Node, return_ftype: &FType) -> Result<(), Error> {
        match node {
            Node::Block(stmts) => {
                for stmt in stmts {
                    self.lower_stmt(stmt, return_ftype)?;
                }
                Ok(())
            }
            Node::Assign { lhs, rhs } => {
                let Node::Variable(target) = &**lhs else {
                    return Err(Error::mismatch("assignment target must be a variable"));
                };
                let produced = result_ftype(rhs)?;
                if produced != target.ftype {
                    return Err(Error::mismatch(format!(
                        "variable `{}` is declared {}, got {produced}",
                        target.name, target.ftype
                    )));
                }
                if produced.is_tensor() {
                    // A bare `b = a` (e.g. left over from simplification)
                    // introduces no loops; `b` just aliases `a`.
                    if matches!(&**rhs, Node::Variable(_)) {
                        let actual = self.buffer_input(rhs)?;
                        let source = self.source_of(&actual)?;
                        self.shape_sources.insert(target.name.clone(), source);
                        self.aliases.insert(target.name.clone(), actual);
                        return Ok(());
                    }
                    self.lower_tensor_expr(rhs, target)
                } else {
                    let value = lower_scalar(rhs)?;
                    self.stmts.push(imp::Node::Assign {
                        lhs: Box::new(imp::Node::var(target)),
                        rhs: Box::new(value),
                    });
                    Ok(())
                }
            }
            Node::Return(value) => {
                let produced = result_ftype(value)?;
                if produced != *return_ftype {
                    return Err(Error::mismatch(format!(
                        "function is declared to return {return_ftype}, got {produced}"
                    )));
                }
                let result = if produced.is_tensor() {
                    imp::Node::var(&self.buffer_input(value)?)
                } else {
                    lower_scalar(value)?
                };
                self.stmts.push(imp::Node::Return(Box::new(result)));
                Ok(())
            }
            other => Err(Error::unsupported(
                format!("{:?}", other.head()),
                "tensor statement lowering",
            )),
        }
    }

    /// Resolve a buffer-producing expression to an imperative variable,
    /// materializing intermediate results into fresh out-parameters.
    fn buffer_input(&mut self, node: &Node) -> Result<Var, Error> {
        match node {
            Node::Variable(var) => {
                if let Some(actual) = self.aliases.get(&var.name) {
                    return Ok(actual.clone());
                }
                if !self.shape_sources.contains_key(&var.name) {
                    return Err(Error::UnboundVariable(var.name.clone()));
                }
                Ok(var.clone())
            }
            Node::Call { .. } => {
                let ftype = result_ftype(node)?;
                let temp = Var::new(format!("_t{}", self.temp_counter), ftype);
                self.temp_counter += 1;
                self.lower_tensor_expr(node, &temp)?;
                Ok(temp)
            }
            other => Err(Error::unsupported(
                format!("{:?}", other.head()),
                "tensor operand lowering",
            )),
        }
    }

    /// Emit the loops computing `expr` into the out-parameter `target`.
    fn lower_tensor_expr(&mut self, expr: &Node, target: &Var) -> Result<(), Error> {
        let Node::Call { op, args } = expr else {
            return Err(Error::unsupported(
                format!("{:?}", expr.head()),
                "tensor expression lowering",
            ));
        };
        let elem = target.ftype.element_type()?;
        match op {
            TensorOp::MkArray => {
                self.register_out(target, elem, 1, ShapeSrc::Fixed(vec![args.len()]));
                for (position, arg) in args.iter().enumerate() {
                    let value = lower_scalar(arg)?;
                    self.stmts.push(imp::Node::store(
                        imp::Node::var(target),
                        vec![imp::Node::int(position as i64)],
                        value,
                    ));
                }
                Ok(())
            }
            TensorOp::Neg => {
                let input = self.buffer_input(&args[0])?;
                let source = self.source_of(&input)?;
                let ndim = target.ftype.ndim();
                self.register_out(target, elem, ndim, source);
                self.elementwise(target, &[&input], |loads| {
                    imp::Node::op_call(OpKind::Neg, loads)
                });
                Ok(())
            }
            TensorOp::Add | TensorOp::Sub => {
                let kind = if *op == TensorOp::Add {
                    OpKind::Add
                } else {
                    OpKind::Sub
                };
                let lhs = self.buffer_input(&args[0])?;
                let rhs = self.buffer_input(&args[1])?;
                let source = self.source_of(&lhs)?;
                let ndim = target.ftype.ndim();
                self.register_out(target, elem, ndim, source);
                self.elementwise(target, &[&lhs, &rhs], |loads| {
                    imp::Node::op_call(kind, loads)
                });
                Ok(())
            }
        }
    }

    fn source_of(&self, input: &Var) -> Result<ShapeSrc, Error> {
        self.shape_sources
            .get(&input.name)
            .cloned()
            .ok_or_else(|| Error::UnboundVariable(input.name.clone()))
    }

    fn register_out(&mut self, target: &Var, elem: ElemType, ndim: usize, shape: ShapeSrc) {
        self.shape_sources
            .insert(target.name.clone(), shape.clone());
        self.outs.push(OutSpec {
            name: target.name.clone(),
            elem,
            ndim,
            shape,
        });
    }

    /// Nested loops over every axis of `target`, storing the combination
    /// of the elementwise loads of `inputs`.
    fn elementwise(
        &mut self,
        target: &Var,
        inputs: &[&Var],
        combine: impl FnOnce(Vec<imp::Node>) -> imp::Node,
    ) {
        let ndim = target.ftype.ndim();
        let idx_vars: Vec<Var> = (0..ndim)
            .map(|axis| Var::scalar(format!("i{axis}"), ElemType::I64))
            .collect();
        let idx_nodes: Vec<imp::Node> = idx_vars.iter().map(imp::Node::var).collect();

        let loads: Vec<imp::Node> = inputs
            .iter()
            .map(|input| imp::Node::load(imp::Node::var(input), idx_nodes.clone()))
            .collect();
        let mut stmt = imp::Node::store(imp::Node::var(target), idx_nodes, combine(loads));

        for axis in (0..ndim).rev() {
            let bound = imp::Node::get_attr(
                imp::Node::shape(imp::Node::var(inputs[0])),
                &format!("element_{axis}"),
            );
            stmt = imp::Node::for_(
                &idx_vars[axis],
                imp::Node::int(0),
                bound,
                imp::Node::block(vec![stmt]),
            );
        }
        self.stmts.push(stmt);
    }
}

fn lower_scalar(node: &Node) -> Result<imp::Node, Error> {
    match node {
        Node::Literal(value) => Ok(imp::Node::Literal(value.clone())),
        Node::Variable(var) if !var.ftype.is_tensor() => Ok(imp::Node::var(var)),
        other => Err(Error::unsupported(
            format!("{:?}", other.head()),
            "scalar operand lowering",
        )),
    }
}

// ─── Execution over the lowered form ───────────────────────────────

/// An array-language program bound to an imperative backend. Output
/// buffers are allocated here, from the plan, before each call.
pub struct TensorProgram {
    inner: Box<dyn Program>,
    plans: HashMap<String, FnPlan>,
}

impl TensorProgram {
    /// Simplify, lower, and hand the module to an imperative backend.
    pub fn compile(backend: &dyn Backend, module: &Node) -> Result<Self, Error> {
        let simplified = simplify(module);
        let lowered = lower(&simplified)?;
        log::debug!("lowered tensor module:\n{}", lowered.module);
        let inner = backend.compile(&lowered.module)?;
        Ok(Self {
            inner,
            plans: lowered.plans,
        })
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let plan = self
            .plans
            .get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_string()))?;
        if args.len() != plan.params.len() {
            return Err(Error::Arity {
                name: name.to_string(),
                expected: plan.params.len(),
                got: args.len(),
            });
        }

        let mut full_args = args.to_vec();
        for out in &plan.outs {
            let shape = match &out.shape {
                ShapeSrc::Fixed(shape) => shape.clone(),
                ShapeSrc::OfParam(param) => {
                    let position = plan
                        .params
                        .iter()
                        .position(|p| p == param)
                        .ok_or_else(|| Error::UnboundVariable(param.clone()))?;
                    match &args[position] {
                        Value::Buffer(cell) => cell.borrow().shape().to_vec(),
                        other => {
                            return Err(Error::mismatch(format!(
                                "parameter `{param}` must be a buffer, got {}",
                                other.type_name()
                            )))
                        }
                    }
                }
            };
            if shape.len() != out.ndim {
                return Err(Error::mismatch(format!(
                    "output `{}` expects rank {}, got shape {shape:?}",
                    out.name, out.ndim
                )));
            }
            full_args.push(Value::buffer(NdBuffer::zeros(out.elem, &shape)?));
        }
        self.inner.call(name, &full_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowered_negate_takes_an_out_parameter() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let b = Var::tensor("b", ElemType::I64, 1);
        let f = Var::tensor("negate", ElemType::I64, 1);
        let module = Node::module(vec![Node::function(
            f,
            vec![a.clone()],
            Node::block(vec![
                Node::assign(&b, Node::call(TensorOp::Neg, vec![Node::var(&a)])),
                Node::ret(Node::var(&b)),
            ]),
        )]);
        let lowered = lower(&module).unwrap();
        let plan = &lowered.plans["negate"];
        assert_eq!(plan.params, vec!["a".to_string()]);
        assert_eq!(plan.outs.len(), 1);
        assert_eq!(plan.outs[0].name, "b");
        assert_eq!(plan.outs[0].shape, ShapeSrc::OfParam("a".to_string()));

        let rendered = lowered.module.to_string();
        assert!(rendered.contains("function negate(a: buf<i64, 1>, b: buf<i64, 1>) -> buf<i64, 1> {"));
        assert!(rendered.contains("for i0 in 0 .. shape(a).element_0 {"));
        assert!(rendered.contains("b[i0] = neg(a[i0])"));
        assert!(rendered.contains("return b"));
    }

    #[test]
    fn test_nested_call_materializes_a_temp() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let b = Var::tensor("b", ElemType::I64, 1);
        let c = Var::tensor("c", ElemType::I64, 1);
        let f = Var::tensor("chain", ElemType::I64, 1);
        // c = add(neg(a), b): the inner neg lands in a fresh out-buffer.
        let module = Node::module(vec![Node::function(
            f,
            vec![a.clone(), b.clone()],
            Node::block(vec![
                Node::assign(
                    &c,
                    Node::call(
                        TensorOp::Add,
                        vec![
                            Node::call(TensorOp::Neg, vec![Node::var(&a)]),
                            Node::var(&b),
                        ],
                    ),
                ),
                Node::ret(Node::var(&c)),
            ]),
        )]);
        let lowered = lower(&module).unwrap();
        let plan = &lowered.plans["chain"];
        let names: Vec<&str> = plan.outs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["_t0", "c"]);
    }

    #[test]
    fn test_shape_mismatch_rejected_at_lowering() {
        let a = Var::tensor("a", ElemType::I64, 1);
        let b = Var::tensor("b", ElemType::I64, 2);
        let c = Var::tensor("c", ElemType::I64, 1);
        let f = Var::tensor("bad", ElemType::I64, 1);
        let module = Node::module(vec![Node::function(
            f,
            vec![a.clone(), b.clone()],
            Node::block(vec![
                Node::assign(
                    &c,
                    Node::call(TensorOp::Add, vec![Node::var(&a), Node::var(&b)]),
                ),
                Node::ret(Node::var(&c)),
            ]),
        )]);
        assert!(matches!(lower(&module).unwrap_err(), Error::TypeMismatch(_)));
    }
}
