//! The array language across all three execution paths: direct
//! interpretation, lowering to the imperative interpreter, and lowering
//! to compiled C. All paths must agree.

use skiff::codegen::CBackend;
use skiff::ftype::ElemType;
use skiff::imp::interp::Interpreter;
use skiff::imp::Var;
use skiff::tensor::interp::TensorInterpreter;
use skiff::tensor::lower::TensorProgram;
use skiff::tensor::{Node, TensorOp};
use skiff::value::Value;
use skiff::NdBuffer;

fn i64_buffer(data: &[i64]) -> Value {
    Value::buffer(NdBuffer::from_i64(data.to_vec(), vec![data.len()]).unwrap())
}

fn buffer_contents(value: &Value) -> NdBuffer {
    match value {
        Value::Buffer(cell) => cell.borrow().clone(),
        other => panic!("expected a buffer, got {other:?}"),
    }
}

/// negate(a) = neg(a) over rank-1 i64 buffers.
fn negate_module() -> Node {
    let a = Var::tensor("a", ElemType::I64, 1);
    let b = Var::tensor("b", ElemType::I64, 1);
    Node::module(vec![Node::function(
        Var::tensor("negate", ElemType::I64, 1),
        vec![a.clone()],
        Node::block(vec![
            Node::assign(&b, Node::call(TensorOp::Neg, vec![Node::var(&a)])),
            Node::ret(Node::var(&b)),
        ]),
    )])
}

/// All execution paths for a module, named for failure messages.
fn run_everywhere(module: &Node, name: &str, args: &[Value]) -> Vec<(String, Value)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut results = Vec::new();

    let direct = TensorInterpreter.load(module).unwrap();
    results.push(("direct".to_string(), direct.call(name, args).unwrap()));

    let lowered = TensorProgram::compile(&Interpreter, module).unwrap();
    results.push(("lowered".to_string(), lowered.call(name, args).unwrap()));

    let backend = CBackend::new();
    if backend.available() {
        let compiled = TensorProgram::compile(&backend, module).unwrap();
        results.push(("compiled".to_string(), compiled.call(name, args).unwrap()));
    } else {
        eprintln!("no C compiler available, skipping compiled path");
    }

    results
}

#[test]
fn test_negate_agrees_everywhere() {
    let results = run_everywhere(&negate_module(), "negate", &[i64_buffer(&[1, -2, 3])]);
    let expected = NdBuffer::from_i64(vec![-1, 2, -3], vec![3]).unwrap();
    for (path, value) in &results {
        assert_eq!(buffer_contents(value), expected, "path {path}");
    }
}

#[test]
fn test_mkarray_agrees_everywhere() {
    let a = Var::tensor("a", ElemType::I64, 1);
    let module = Node::module(vec![Node::function(
        Var::tensor("mk", ElemType::I64, 1),
        vec![],
        Node::block(vec![
            Node::assign(
                &a,
                Node::call(
                    TensorOp::MkArray,
                    vec![Node::int(1), Node::int(2), Node::int(3)],
                ),
            ),
            Node::ret(Node::var(&a)),
        ]),
    )]);
    let results = run_everywhere(&module, "mk", &[]);
    let expected = NdBuffer::from_i64(vec![1, 2, 3], vec![3]).unwrap();
    for (path, value) in &results {
        assert_eq!(buffer_contents(value), expected, "path {path}");
    }
}

#[test]
fn test_add_and_sub_agree_everywhere() {
    let a = Var::tensor("a", ElemType::I64, 1);
    let b = Var::tensor("b", ElemType::I64, 1);
    let c = Var::tensor("c", ElemType::I64, 1);
    let module = Node::module(vec![
        Node::function(
            Var::tensor("plus", ElemType::I64, 1),
            vec![a.clone(), b.clone()],
            Node::block(vec![
                Node::assign(
                    &c,
                    Node::call(TensorOp::Add, vec![Node::var(&a), Node::var(&b)]),
                ),
                Node::ret(Node::var(&c)),
            ]),
        ),
        Node::function(
            Var::tensor("minus", ElemType::I64, 1),
            vec![a.clone(), b.clone()],
            Node::block(vec![
                Node::assign(
                    &c,
                    Node::call(TensorOp::Sub, vec![Node::var(&a), Node::var(&b)]),
                ),
                Node::ret(Node::var(&c)),
            ]),
        ),
    ]);

    let args = [i64_buffer(&[1, 2, 3]), i64_buffer(&[4, 5, 6])];
    for (path, value) in run_everywhere(&module, "plus", &args) {
        assert_eq!(
            buffer_contents(&value),
            NdBuffer::from_i64(vec![5, 7, 9], vec![3]).unwrap(),
            "path {path}"
        );
    }
    for (path, value) in run_everywhere(&module, "minus", &args) {
        assert_eq!(
            buffer_contents(&value),
            NdBuffer::from_i64(vec![-3, -3, -3], vec![3]).unwrap(),
            "path {path}"
        );
    }
}

#[test]
fn test_double_negation_simplifies_and_still_runs() {
    // neg(neg(a)) simplifies to a before lowering; the program then has
    // no work to do beyond returning its argument... except the result
    // variable still gets bound, so the identity flows through it.
    let a = Var::tensor("a", ElemType::I64, 1);
    let b = Var::tensor("b", ElemType::I64, 1);
    let module = Node::module(vec![Node::function(
        Var::tensor("same", ElemType::I64, 1),
        vec![a.clone()],
        Node::block(vec![
            Node::assign(
                &b,
                Node::call(
                    TensorOp::Neg,
                    vec![Node::call(TensorOp::Neg, vec![Node::var(&a)])],
                ),
            ),
            Node::ret(Node::var(&b)),
        ]),
    )]);
    let results = run_everywhere(&module, "same", &[i64_buffer(&[7, -8])]);
    let expected = NdBuffer::from_i64(vec![7, -8], vec![2]).unwrap();
    for (path, value) in &results {
        assert_eq!(buffer_contents(value), expected, "path {path}");
    }
}

#[test]
fn test_two_dimensional_negate() {
    let a = Var::tensor("a", ElemType::I64, 2);
    let b = Var::tensor("b", ElemType::I64, 2);
    let module = Node::module(vec![Node::function(
        Var::tensor("negate2", ElemType::I64, 2),
        vec![a.clone()],
        Node::block(vec![
            Node::assign(&b, Node::call(TensorOp::Neg, vec![Node::var(&a)])),
            Node::ret(Node::var(&b)),
        ]),
    )]);
    let input = Value::buffer(NdBuffer::from_i64(vec![1, 2, 3, 4], vec![2, 2]).unwrap());
    let results = run_everywhere(&module, "negate2", &[input]);
    let expected = NdBuffer::from_i64(vec![-1, -2, -3, -4], vec![2, 2]).unwrap();
    for (path, value) in &results {
        assert_eq!(buffer_contents(value), expected, "path {path}");
    }
}
