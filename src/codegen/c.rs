//! C code generation from the imperative IR.
//!
//! One translation unit per module: a uniform buffer descriptor
//! (`skf_buf`) shared by every rank and element type, a typedef per
//! aggregate FType, one readable C function per IR function, and one
//! `__entry` wrapper per function exposing the uniform
//! `void(void** argv, void* ret)` ABI the loader binds against.
//!
//! The element type of every buffer access is known statically from the
//! FType, so loads and stores cast the `void*` data pointer at emission
//! time. Aggregate members are restricted to 8-byte scalars (recursively),
//! which keeps struct layout padding-free and marshalling exact.

use std::collections::HashSet;

use crate::error::Error;
use crate::ftype::{ElemType, FType};
use crate::imp::{result_ftype, tuple_position, Node, Var};
use crate::term::Term;
use crate::value::{Const, OpKind};

/// The C name of the uniform buffer descriptor.
const BUF_TYPEDEF: &str = "typedef struct {\n    void* data;\n    const int64_t* shape;\n    int64_t ndim;\n    int64_t len;\n} skf_buf;";

/// Generate the complete translation unit for a module.
pub fn generate(module: &Node) -> Result<String, Error> {
    let Node::Module(items) = module else {
        return Err(Error::unsupported(
            format!("{:?}", module.head()),
            "C generation",
        ));
    };

    let mut gen = CGenerator::new();
    let mut functions = Vec::new();
    let mut entries = Vec::new();
    for item in items {
        let (name, params, body) = split_function(item)?;
        functions.push(gen.emit_function(&name, &params, body)?);
        entries.push(gen.emit_entry(&name, &params)?);
    }

    let mut sections = vec![
        "#include <stdbool.h>\n#include <stddef.h>\n#include <stdint.h>".to_string(),
        BUF_TYPEDEF.to_string(),
    ];
    sections.extend(gen.typedefs);
    sections.extend(functions);
    sections.extend(entries);
    Ok(sections.join("\n\n") + "\n")
}

/// Destructure a `Function` node into name, parameters, and body.
pub(crate) fn split_function(node: &Node) -> Result<(Var, Vec<Var>, &Node), Error> {
    let Node::Function { name, params, body } = node else {
        return Err(Error::unsupported(
            format!("{:?}", node.head()),
            "function extraction",
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
    Ok((name.clone(), params, &**body))
}

struct CGenerator {
    typedef_names: HashSet<String>,
    typedefs: Vec<String>,
}

impl CGenerator {
    fn new() -> Self {
        Self {
            typedef_names: HashSet::new(),
            typedefs: Vec::new(),
        }
    }

    /// The C spelling of an FType, creating aggregate typedefs on demand.
    fn c_type(&mut self, ftype: &FType) -> Result<String, Error> {
        match ftype {
            FType::Scalar(elem) => Ok(elem.c_name().to_string()),
            FType::Tensor { .. } => Ok("skf_buf".to_string()),
            FType::Tuple(_) | FType::Record(_) => self.aggregate(ftype),
        }
    }

    fn aggregate(&mut self, ftype: &FType) -> Result<String, Error> {
        let name = format!("skf_{}", type_code(ftype)?);
        if self.typedef_names.contains(&name) {
            return Ok(name);
        }

        let fields: Vec<(String, FType)> = match ftype {
            FType::Tuple(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("e{i}"), item.clone()))
                .collect(),
            FType::Record(entries) => entries.clone(),
            _ => unreachable!("aggregate() is only called for tuples and records"),
        };

        let mut lines = vec!["typedef struct {".to_string()];
        for (field, field_ftype) in &fields {
            if field_ftype.is_tensor() {
                return Err(Error::mismatch(
                    "aggregate members must be 8-byte scalars, not buffers",
                ));
            }
            // Recursion emits inner typedefs ahead of this one.
            let cty = self.c_type(field_ftype)?;
            lines.push(format!("    {cty} {field};"));
        }
        lines.push(format!("}} {name};"));

        self.typedef_names.insert(name.clone());
        self.typedefs.push(lines.join("\n"));
        Ok(name)
    }

    fn emit_function(&mut self, name: &Var, params: &[Var], body: &Node) -> Result<String, Error> {
        let ret = self.c_type(&name.ftype)?;
        let mut signature = Vec::new();
        for param in params {
            signature.push(format!("{} {}", self.c_type(&param.ftype)?, param.name));
        }

        let mut emitter = FnEmitter {
            gen: self,
            lines: Vec::new(),
            indent: 1,
            scopes: vec![params.iter().map(|p| p.name.clone()).collect()],
        };
        emitter.emit_body_stmts(body)?;
        let body_lines = emitter.lines;

        let mut lines = vec![format!("{ret} {}({}) {{", name.name, signature.join(", "))];
        lines.extend(body_lines);
        lines.push("}".to_string());
        Ok(lines.join("\n"))
    }

    fn emit_entry(&mut self, name: &Var, params: &[Var]) -> Result<String, Error> {
        let ret = self.c_type(&name.ftype)?;
        let mut args = Vec::new();
        for (i, param) in params.iter().enumerate() {
            args.push(format!("*({}*)argv[{i}]", self.c_type(&param.ftype)?));
        }
        Ok(format!(
            "void {name}__entry(void** argv, void* ret) {{\n    {ret} result = {name}({args});\n    *({ret}*)ret = result;\n}}",
            name = name.name,
            ret = ret,
            args = args.join(", ")
        ))
    }
}

/// Short structural code used to mangle aggregate typedef names.
fn type_code(ftype: &FType) -> Result<String, Error> {
    match ftype {
        FType::Scalar(ElemType::I64) => Ok("i".to_string()),
        FType::Scalar(ElemType::F64) => Ok("d".to_string()),
        FType::Scalar(ElemType::Bool) => Ok("b".to_string()),
        FType::Tuple(items) => {
            let mut code = "t".to_string();
            for item in items {
                code.push_str(&type_code(item)?);
            }
            code.push('e');
            Ok(code)
        }
        FType::Record(fields) => {
            let mut code = "r".to_string();
            for (name, item) in fields {
                code.push('_');
                code.push_str(name);
                code.push('_');
                code.push_str(&type_code(item)?);
            }
            Ok(code)
        }
        FType::Tensor { .. } => Err(Error::mismatch(
            "buffers cannot appear inside aggregate types",
        )),
    }
}

struct FnEmitter<'a> {
    gen: &'a mut CGenerator,
    lines: Vec<String>,
    indent: usize,
    scopes: Vec<HashSet<String>>,
}

impl FnEmitter<'_> {
    fn line(&mut self, text: String) {
        self.lines.push(format!("{}{text}", "    ".repeat(self.indent)));
    }

    fn declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    /// Emit the statements of a body node inside the surrounding braces,
    /// scoped like a C block.
    fn emit_body_stmts(&mut self, body: &Node) -> Result<(), Error> {
        self.scopes.push(HashSet::new());
        let result = match body {
            Node::Block(stmts) => stmts.iter().try_for_each(|stmt| self.emit_stmt(stmt)),
            single => self.emit_stmt(single),
        };
        self.scopes.pop();
        result
    }

    fn emit_stmt(&mut self, node: &Node) -> Result<(), Error> {
        match node {
            Node::Block(_) => {
                self.line("{".to_string());
                self.indent += 1;
                self.emit_body_stmts(node)?;
                self.indent -= 1;
                self.line("}".to_string());
                Ok(())
            }
            Node::Assign { lhs, rhs } => {
                let Node::Variable(var) = &**lhs else {
                    return Err(Error::mismatch("assignment target must be a variable"));
                };
                let value = emit_expr(rhs)?;
                if self.declared(&var.name) {
                    self.line(format!("{} = {value};", var.name));
                } else {
                    let cty = self.gen.c_type(&var.ftype)?;
                    self.scopes
                        .last_mut()
                        .expect("at least the function scope")
                        .insert(var.name.clone());
                    self.line(format!("{cty} {} = {value};", var.name));
                }
                Ok(())
            }
            Node::Store {
                buffer,
                index,
                value,
            } => {
                let access = emit_element(buffer, index)?;
                let value = emit_expr(value)?;
                self.line(format!("{access} = {value};"));
                Ok(())
            }
            Node::If { cond, body } => {
                let cond = emit_expr(cond)?;
                self.line(format!("if ({cond}) {{"));
                self.indent += 1;
                self.emit_body_stmts(body)?;
                self.indent -= 1;
                self.line("}".to_string());
                Ok(())
            }
            Node::IfElse {
                cond,
                then_body,
                else_body,
            } => {
                let cond = emit_expr(cond)?;
                self.line(format!("if ({cond}) {{"));
                self.indent += 1;
                self.emit_body_stmts(then_body)?;
                self.indent -= 1;
                self.line("} else {".to_string());
                self.indent += 1;
                self.emit_body_stmts(else_body)?;
                self.indent -= 1;
                self.line("}".to_string());
                Ok(())
            }
            Node::For {
                var,
                start,
                end,
                body,
            } => {
                let Node::Variable(counter) = &**var else {
                    return Err(Error::mismatch("loop variable must be a variable"));
                };
                let start = emit_expr(start)?;
                let end = emit_expr(end)?;
                let v = &counter.name;
                self.line(format!(
                    "for (int64_t {v} = {start}; {v} < {end}; {v}++) {{"
                ));
                self.indent += 1;
                self.scopes.push(HashSet::from([v.clone()]));
                let result = self.emit_body_stmts(body);
                self.scopes.pop();
                self.indent -= 1;
                result?;
                self.line("}".to_string());
                Ok(())
            }
            Node::Return(value) => {
                let value = emit_expr(value)?;
                self.line(format!("return {value};"));
                Ok(())
            }
            other => Err(Error::unsupported(
                format!("{:?}", other.head()),
                "C statement emission",
            )),
        }
    }
}

/// Render an expression node to C.
fn emit_expr(node: &Node) -> Result<String, Error> {
    match node {
        Node::Literal(Const::Int(v)) => Ok(format!("{v}")),
        Node::Literal(Const::Float(v)) => Ok(format!("{v:?}")),
        Node::Literal(Const::Bool(v)) => Ok(format!("{v}")),
        Node::Variable(var) => Ok(var.name.clone()),
        Node::Call { op, args } => {
            let Node::Literal(Const::Op(kind)) = &**op else {
                return Err(Error::mismatch("call operator is not a builtin"));
            };
            let args = args.iter().map(emit_expr).collect::<Result<Vec<_>, _>>()?;
            if args.len() != kind.arity() {
                return Err(Error::Arity {
                    name: kind.as_str().to_string(),
                    expected: kind.arity(),
                    got: args.len(),
                });
            }
            Ok(match kind {
                OpKind::Neg => format!("(-{})", args[0]),
                OpKind::Add => format!("({} + {})", args[0], args[1]),
                OpKind::Sub => format!("({} - {})", args[0], args[1]),
                OpKind::Mul => format!("({} * {})", args[0], args[1]),
                OpKind::Eq => format!("({} == {})", args[0], args[1]),
                OpKind::Lt => format!("({} < {})", args[0], args[1]),
            })
        }
        Node::Load { buffer, index } => emit_element(buffer, index),
        Node::Length(buffer) => Ok(format!("{}.len", emit_expr(buffer)?)),
        Node::GetAttr { object, attr } => {
            let Node::Literal(Const::Str(name)) = &**attr else {
                return Err(Error::mismatch("attribute name is not a string literal"));
            };
            // shape(x).element_k reads straight from the descriptor.
            if let Node::Shape(buffer) = &**object {
                let ndim = result_ftype(buffer)?.ndim();
                let position = tuple_position(name, ndim)?;
                return Ok(format!("{}.shape[{position}]", emit_expr(buffer)?));
            }
            match result_ftype(object)? {
                FType::Tuple(items) => {
                    let position = tuple_position(name, items.len())?;
                    Ok(format!("{}.e{position}", emit_expr(object)?))
                }
                FType::Record(_) => Ok(format!("{}.{name}", emit_expr(object)?)),
                other => Err(Error::mismatch(format!(
                    "{other} does not support attribute access"
                ))),
            }
        }
        other => Err(Error::unsupported(
            format!("{:?}", other.head()),
            "C expression emission",
        )),
    }
}

/// Render a buffer element access: cast the data pointer to the element
/// type and index row-major.
fn emit_element(buffer: &Node, index: &[Node]) -> Result<String, Error> {
    let elem = result_ftype(buffer)?.element_type()?;
    let buf = emit_expr(buffer)?;
    if index.is_empty() {
        return Err(Error::mismatch("element access needs at least one index"));
    }
    let mut linear = emit_expr(&index[0])?;
    for (axis, i) in index.iter().enumerate().skip(1) {
        linear = format!("({linear}) * {buf}.shape[{axis}] + {}", emit_expr(i)?);
    }
    Ok(format!("(({}*){buf}.data)[{linear}]", elem.c_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OpKind;

    #[test]
    fn test_expression_emission() {
        let a = Var::tensor("a", ElemType::F64, 1);
        let i = Var::scalar("i", ElemType::I64);
        let load = Node::load(Node::var(&a), vec![Node::var(&i)]);
        assert_eq!(emit_expr(&load).unwrap(), "((double*)a.data)[i]");
        let call = Node::op_call(OpKind::Mul, vec![load.clone(), load]);
        assert_eq!(
            emit_expr(&call).unwrap(),
            "(((double*)a.data)[i] * ((double*)a.data)[i])"
        );
    }

    #[test]
    fn test_two_dimensional_access_is_row_major() {
        let a = Var::tensor("a", ElemType::I64, 2);
        let i = Var::scalar("i", ElemType::I64);
        let j = Var::scalar("j", ElemType::I64);
        let load = Node::load(Node::var(&a), vec![Node::var(&i), Node::var(&j)]);
        assert_eq!(
            emit_expr(&load).unwrap(),
            "((int64_t*)a.data)[(i) * a.shape[1] + j]"
        );
    }

    #[test]
    fn test_shape_projection_reads_descriptor() {
        let a = Var::tensor("a", ElemType::F64, 2);
        let attr = Node::get_attr(Node::shape(Node::var(&a)), "element_1");
        assert_eq!(emit_expr(&attr).unwrap(), "a.shape[1]");
    }

    #[test]
    fn test_aggregate_typedefs_are_mangled_and_deduplicated() {
        let mut gen = CGenerator::new();
        let tup = FType::Tuple(vec![
            FType::Scalar(ElemType::I64),
            FType::Scalar(ElemType::F64),
        ]);
        let name = gen.aggregate(&tup).unwrap();
        assert_eq!(name, "skf_tide");
        let again = gen.aggregate(&tup).unwrap();
        assert_eq!(again, name);
        assert_eq!(gen.typedefs.len(), 1);
        assert!(gen.typedefs[0].contains("int64_t e0;"));
        assert!(gen.typedefs[0].contains("double e1;"));
    }

    #[test]
    fn test_buffers_rejected_inside_aggregates() {
        let mut gen = CGenerator::new();
        let bad = FType::Tuple(vec![FType::tensor(ElemType::F64, 1)]);
        assert!(gen.aggregate(&bad).is_err());
    }

    #[test]
    fn test_generated_function_shape() {
        let f = Var::scalar("bump", ElemType::I64);
        let a = Var::tensor("a", ElemType::I64, 1);
        let i = Var::scalar("i", ElemType::I64);
        let module = Node::module(vec![Node::function(
            f,
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
                            vec![Node::load(Node::var(&a), vec![Node::var(&i)]), Node::int(1)],
                        ),
                    ),
                ),
                Node::ret(Node::int(0)),
            ]),
        )]);
        let unit = generate(&module).unwrap();
        assert!(unit.contains("int64_t bump(skf_buf a) {"));
        assert!(unit.contains("for (int64_t i = 0; i < a.len; i++) {"));
        assert!(unit.contains("((int64_t*)a.data)[i] = (((int64_t*)a.data)[i] + 1);"));
        assert!(unit.contains("void bump__entry(void** argv, void* ret) {"));
    }
}
