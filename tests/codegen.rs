//! The C backend: raw toolchain smoke test, golden generated code, and
//! the interpreter/compiler equivalence contract.

use skiff::backend::Backend;
use skiff::codegen::c::generate;
use skiff::codegen::{CBackend, Toolchain};
use skiff::ftype::{ElemType, FType};
use skiff::imp::interp::Interpreter;
use skiff::imp::{Node, Var};
use skiff::value::{OpKind, Value};
use skiff::{Error, NdBuffer};

fn f64_buffer(data: &[f64]) -> Value {
    Value::buffer(NdBuffer::from_f64(data.to_vec(), vec![data.len()]).unwrap())
}

fn dot_product_module() -> Node {
    let c = Var::scalar("c", ElemType::F64);
    let i = Var::scalar("i", ElemType::I64);
    let a = Var::tensor("a", ElemType::F64, 1);
    let b = Var::tensor("b", ElemType::F64, 1);
    Node::module(vec![Node::function(
        Var::scalar("dot_product", ElemType::F64),
        vec![a.clone(), b.clone()],
        Node::block(vec![
            Node::assign(&c, Node::float(0.0)),
            Node::for_(
                &i,
                Node::int(0),
                Node::length(Node::var(&a)),
                Node::block(vec![Node::assign(
                    &c,
                    Node::op_call(
                        OpKind::Add,
                        vec![
                            Node::var(&c),
                            Node::op_call(
                                OpKind::Mul,
                                vec![
                                    Node::load(Node::var(&a), vec![Node::var(&i)]),
                                    Node::load(Node::var(&b), vec![Node::var(&i)]),
                                ],
                            ),
                        ],
                    ),
                )]),
            ),
            Node::ret(Node::var(&c)),
        ]),
    )])
}

/// Build, load, and call a hand-written C function through the raw
/// toolchain surface.
#[test]
fn test_load_shared_lib() {
    let toolchain = Toolchain::from_env();
    if !toolchain.available() {
        eprintln!("no C compiler available, skipping");
        return;
    }
    let c_code = "#include <stdint.h>\n\nint64_t add(int64_t a, int64_t b) {\n    return a + b;\n}\n";
    let dir = tempfile::tempdir().unwrap();
    let lib_path = toolchain.build(c_code, dir.path(), "adder").unwrap();
    let library = unsafe { libloading::Library::new(&lib_path) }.unwrap();
    let add: libloading::Symbol<unsafe extern "C" fn(i64, i64) -> i64> =
        unsafe { library.get(b"add").unwrap() };
    let result = unsafe { add(3, 4) };
    assert_eq!(result, 7);
}

#[test]
fn test_generated_c_for_dot_product() {
    let source = generate(&dot_product_module()).unwrap();
    insta::assert_snapshot!(source);
}

#[test]
fn test_dot_product_backends_agree() {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = dot_product_module();
    let interpreted = Interpreter.compile(&module).unwrap();
    let expected = interpreted
        .call("dot_product", &[f64_buffer(&[1.0, 2.0, 3.0]), f64_buffer(&[4.0, 5.0, 6.0])])
        .unwrap();
    assert_eq!(expected, Value::Float(32.0));

    let backend = CBackend::new();
    if !backend.available() {
        eprintln!("no C compiler available, skipping compiled half");
        return;
    }
    let compiled = backend.compile(&module).unwrap();
    let result = compiled
        .call("dot_product", &[f64_buffer(&[1.0, 2.0, 3.0]), f64_buffer(&[4.0, 5.0, 6.0])])
        .unwrap();
    assert_eq!(result, expected);
}

#[test]
fn test_store_visible_through_compiled_call() {
    // The compiled function mutates its argument buffer in place.
    let backend = CBackend::new();
    if !backend.available() {
        eprintln!("no C compiler available, skipping");
        return;
    }
    let a = Var::tensor("a", ElemType::F64, 1);
    let i = Var::scalar("i", ElemType::I64);
    let module = Node::module(vec![Node::function(
        Var::scalar("bump", ElemType::I64),
        vec![a.clone()],
        Node::block(vec![
            Node::for_(
                &i,
                Node::int(0),
                Node::length(Node::var(&a)),
                Node::store(
                    Node::var(&a),
                    vec![Node::var(&i)],
                    Node::op_call(
                        OpKind::Add,
                        vec![
                            Node::load(Node::var(&a), vec![Node::var(&i)]),
                            Node::float(1.0),
                        ],
                    ),
                ),
            ),
            Node::ret(Node::int(0)),
        ]),
    )]);
    let program = backend.compile(&module).unwrap();
    let buffer = f64_buffer(&[1.0, 2.0, 3.0]);
    program.call("bump", &[buffer.clone()]).unwrap();
    assert_eq!(buffer, f64_buffer(&[2.0, 3.0, 4.0]));
}

#[test]
fn test_if_else_backends_agree() {
    let a = Var::scalar("a", ElemType::I64);
    let module = Node::module(vec![Node::function(
        Var::scalar("if_else", ElemType::I64),
        vec![],
        Node::block(vec![
            Node::assign(&a, Node::int(5)),
            Node::if_(
                Node::op_call(OpKind::Eq, vec![Node::var(&a), Node::int(5)]),
                Node::block(vec![Node::assign(
                    &a,
                    Node::op_call(OpKind::Add, vec![Node::var(&a), Node::int(10)]),
                )]),
            ),
            Node::if_else(
                Node::op_call(OpKind::Lt, vec![Node::var(&a), Node::int(15)]),
                Node::block(vec![Node::assign(
                    &a,
                    Node::op_call(OpKind::Sub, vec![Node::var(&a), Node::int(3)]),
                )]),
                Node::block(vec![Node::assign(
                    &a,
                    Node::op_call(OpKind::Mul, vec![Node::var(&a), Node::int(2)]),
                )]),
            ),
            Node::ret(Node::var(&a)),
        ]),
    )]);
    let expected = Interpreter
        .compile(&module)
        .unwrap()
        .call("if_else", &[])
        .unwrap();
    assert_eq!(expected, Value::Int(30));

    let backend = CBackend::new();
    if !backend.available() {
        eprintln!("no C compiler available, skipping compiled half");
        return;
    }
    let result = backend
        .compile(&module)
        .unwrap()
        .call("if_else", &[])
        .unwrap();
    assert_eq!(result, expected);
}

#[test]
fn test_tuple_arguments_cross_the_boundary() {
    // tuple_dot(x, y) = x.element_0 * y.element_0 + x.element_1 * y.element_1
    let pair = FType::Tuple(vec![
        FType::Scalar(ElemType::I64),
        FType::Scalar(ElemType::I64),
    ]);
    let x = Var::new("x", pair.clone());
    let y = Var::new("y", pair.clone());
    let result_var = Var::scalar("result", ElemType::I64);
    let module = Node::module(vec![Node::function(
        Var::scalar("tuple_dot", ElemType::I64),
        vec![x.clone(), y.clone()],
        Node::block(vec![
            Node::assign(
                &result_var,
                Node::op_call(
                    OpKind::Add,
                    vec![
                        Node::op_call(
                            OpKind::Mul,
                            vec![
                                Node::get_attr(Node::var(&x), "element_0"),
                                Node::get_attr(Node::var(&y), "element_0"),
                            ],
                        ),
                        Node::op_call(
                            OpKind::Mul,
                            vec![
                                Node::get_attr(Node::var(&x), "element_1"),
                                Node::get_attr(Node::var(&y), "element_1"),
                            ],
                        ),
                    ],
                ),
            ),
            Node::ret(Node::var(&result_var)),
        ]),
    )]);

    let x_value = Value::Tuple(vec![Value::Int(5), Value::Int(3)]);
    let y_value = Value::Tuple(vec![Value::Int(2), Value::Int(4)]);
    let expected = Interpreter
        .compile(&module)
        .unwrap()
        .call("tuple_dot", &[x_value.clone(), y_value.clone()])
        .unwrap();
    assert_eq!(expected, Value::Int(22));

    let backend = CBackend::new();
    if !backend.available() {
        eprintln!("no C compiler available, skipping compiled half");
        return;
    }
    let result = backend
        .compile(&module)
        .unwrap()
        .call("tuple_dot", &[x_value, y_value])
        .unwrap();
    assert_eq!(result, expected);
}

#[test]
fn test_build_failure_carries_generated_source() {
    let bogus = Toolchain {
        cc: "definitely-not-a-compiler".to_string(),
        cflags: vec![],
        shared_flags: vec![],
        suffix: ".so".to_string(),
    };
    let err = match CBackend::with_toolchain(bogus).compile(&dot_product_module()) {
        Ok(_) => panic!("expected BuildFailure, got a compiled program"),
        Err(err) => err,
    };
    match err {
        Error::BuildFailure { source, .. } => {
            assert!(source.contains("double dot_product(skf_buf a, skf_buf b)"));
        }
        other => panic!("expected BuildFailure, got {other:?}"),
    }
}
