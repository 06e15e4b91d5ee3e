//! Deterministic textual rendering of the imperative IR.
//!
//! Statements render through a printer context that carries the
//! indentation state, so nested blocks indent consistently; expressions
//! render inline. The output is the diagnostic form used in error
//! messages and golden tests.

use std::fmt;

use crate::imp::Node;
use crate::value::Const;

/// Printer context: a line buffer plus the current indentation.
pub struct PrintCtx {
    tab: &'static str,
    indent: usize,
    lines: Vec<String>,
}

impl PrintCtx {
    pub fn new() -> Self {
        Self {
            tab: "    ",
            indent: 0,
            lines: Vec::new(),
        }
    }

    fn feed(&self) -> String {
        self.tab.repeat(self.indent)
    }

    pub(crate) fn line(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", self.feed(), text.as_ref()));
    }

    /// Run `body` one indentation level deeper.
    pub(crate) fn nested(&mut self, body: impl FnOnce(&mut Self)) {
        self.indent += 1;
        body(self);
        self.indent -= 1;
    }

    pub fn emit(self) -> String {
        self.lines.join("\n")
    }
}

impl Default for PrintCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// Render any node. Statements and structure go through the context;
/// expression nodes become a single line.
pub fn write_node(ctx: &mut PrintCtx, node: &Node) {
    match node {
        Node::Module(functions) => {
            ctx.line("module {");
            ctx.nested(|ctx| {
                for function in functions {
                    write_node(ctx, function);
                }
            });
            ctx.line("}");
        }
        Node::Function { name, params, body } => {
            let (fn_name, ret) = match &**name {
                Node::Variable(v) => (v.name.clone(), v.ftype.to_string()),
                other => (expr_str(other), "?".to_string()),
            };
            let params: Vec<String> = params
                .iter()
                .map(|p| match p {
                    Node::Variable(v) => format!("{}: {}", v.name, v.ftype),
                    other => expr_str(other),
                })
                .collect();
            ctx.line(format!(
                "function {fn_name}({}) -> {ret} {{",
                params.join(", ")
            ));
            ctx.nested(|ctx| write_body(ctx, body));
            ctx.line("}");
        }
        Node::Block(stmts) => {
            ctx.line("{");
            ctx.nested(|ctx| {
                for stmt in stmts {
                    write_node(ctx, stmt);
                }
            });
            ctx.line("}");
        }
        Node::Assign { lhs, rhs } => {
            ctx.line(format!("{} = {}", expr_str(lhs), expr_str(rhs)));
        }
        Node::Store {
            buffer,
            index,
            value,
        } => {
            ctx.line(format!(
                "{}[{}] = {}",
                expr_str(buffer),
                index_str(index),
                expr_str(value)
            ));
        }
        Node::If { cond, body } => {
            ctx.line(format!("if {} {{", expr_str(cond)));
            ctx.nested(|ctx| write_body(ctx, body));
            ctx.line("}");
        }
        Node::IfElse {
            cond,
            then_body,
            else_body,
        } => {
            ctx.line(format!("if {} {{", expr_str(cond)));
            ctx.nested(|ctx| write_body(ctx, then_body));
            ctx.line("} else {");
            ctx.nested(|ctx| write_body(ctx, else_body));
            ctx.line("}");
        }
        Node::For {
            var,
            start,
            end,
            body,
        } => {
            ctx.line(format!(
                "for {} in {} .. {} {{",
                expr_str(var),
                expr_str(start),
                expr_str(end)
            ));
            ctx.nested(|ctx| write_body(ctx, body));
            ctx.line("}");
        }
        Node::Return(value) => {
            ctx.line(format!("return {}", expr_str(value)));
        }
        expr => ctx.line(expr_str(expr)),
    }
}

/// Write a statement body without doubling braces around blocks.
fn write_body(ctx: &mut PrintCtx, body: &Node) {
    match body {
        Node::Block(stmts) => {
            for stmt in stmts {
                write_node(ctx, stmt);
            }
        }
        other => write_node(ctx, other),
    }
}

fn index_str(index: &[Node]) -> String {
    index.iter().map(expr_str).collect::<Vec<_>>().join(", ")
}

/// Inline rendering of an expression node.
pub fn expr_str(node: &Node) -> String {
    match node {
        Node::Literal(Const::Str(text)) => text.clone(),
        Node::Literal(value) => value.to_string(),
        Node::Variable(v) => v.name.clone(),
        Node::Call { op, args } => {
            let args: Vec<String> = args.iter().map(expr_str).collect();
            format!("{}({})", expr_str(op), args.join(", "))
        }
        Node::Load { buffer, index } => {
            format!("{}[{}]", expr_str(buffer), index_str(index))
        }
        Node::Length(buffer) => format!("length({})", expr_str(buffer)),
        Node::Shape(buffer) => format!("shape({})", expr_str(buffer)),
        Node::GetAttr { object, attr } => {
            format!("{}.{}", expr_str(object), expr_str(attr))
        }
        statement => {
            // A statement in expression position still renders, flattened.
            let mut ctx = PrintCtx::new();
            write_node(&mut ctx, statement);
            ctx.emit()
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ctx = PrintCtx::new();
        write_node(&mut ctx, self);
        write!(f, "{}", ctx.emit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftype::ElemType;
    use crate::imp::Var;
    use crate::value::OpKind;

    #[test]
    fn test_expression_rendering() {
        let a = Var::tensor("a", ElemType::F64, 1);
        let i = Var::scalar("i", ElemType::I64);
        let load = Node::load(Node::var(&a), vec![Node::var(&i)]);
        assert_eq!(expr_str(&load), "a[i]");
        let call = Node::op_call(OpKind::Add, vec![load, Node::int(1)]);
        assert_eq!(expr_str(&call), "add(a[i], 1)");
    }

    #[test]
    fn test_nested_blocks_indent() {
        let i = Var::scalar("i", ElemType::I64);
        let s = Var::scalar("s", ElemType::I64);
        let body = Node::block(vec![Node::assign(
            &s,
            Node::op_call(OpKind::Add, vec![Node::var(&s), Node::var(&i)]),
        )]);
        let loop_node = Node::for_(&i, Node::int(0), Node::int(3), body);
        let rendered = loop_node.to_string();
        assert_eq!(
            rendered,
            "for i in 0 .. 3 {\n    s = add(s, i)\n}"
        );
    }

    #[test]
    fn test_function_signature_renders_ftypes() {
        let a = Var::tensor("a", ElemType::F64, 1);
        let f = Node::function(
            Var::scalar("total", ElemType::F64),
            vec![a.clone()],
            Node::block(vec![Node::ret(Node::float(0.0))]),
        );
        let rendered = f.to_string();
        assert!(rendered.starts_with("function total(a: buf<f64, 1>) -> f64 {"));
        assert!(rendered.contains("    return 0.0"));
    }
}
