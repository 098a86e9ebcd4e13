use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::ir::{BinOp, Expr, Function, ShaderModule, Stmt, Type};

pub mod glsl;
pub mod wgsl;

pub use glsl::GlslPrinter;
pub use wgsl::WgslPrinter;

const COMPONENTS: [&str; 4] = ["x", "y", "z", "w"];
const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// GLSL 450, compiled by wgpu through naga's GLSL frontend.
    #[default]
    Glsl,
    Wgsl,
}

impl Dialect {
    pub fn printer(self) -> Box<dyn ShaderPrinter> {
        match self {
            Dialect::Glsl => Box::new(GlslPrinter),
            Dialect::Wgsl => Box::new(WgslPrinter),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Dialect::Glsl => "glsl",
            Dialect::Wgsl => "wgsl",
        }
    }
}

/// Renders IR as shading-language text. Implementors only provide the
/// dialect-specific spellings; expression and statement layout is shared.
pub trait ShaderPrinter {
    fn type_name(&self, ty: Type) -> String;

    fn uniform(&self, name: &str) -> String;

    fn invocation_id(&self, axis: usize) -> String;

    fn declaration(&self, mutable: bool, name: &str, ty: Type, value: &str) -> String;

    fn for_header(&self, var: &str, start: &str, end: &str, step: &str) -> String;

    fn function_header(&self, f: &Function) -> String;

    /// Member list of the uniform block, in declaration order.
    fn uniform_layout(&self, members: &[(&str, Type)]) -> String;

    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Int(v) if *v < 0 => format!("({})", v),
            Expr::Int(v) => v.to_string(),
            Expr::Float(v) if *v < 0.0 => format!("({:?})", v),
            Expr::Float(v) => format!("{:?}", v),
            Expr::Var(name) => name.clone(),
            Expr::Uniform(name) => self.uniform(name),
            Expr::InvocationId(axis) => self.invocation_id(*axis),
            Expr::Component(base, i) => match base.as_ref() {
                Expr::Binary(..) => format!("({}).{}", self.expr(base), COMPONENTS[*i]),
                _ => format!("{}.{}", self.expr(base), COMPONENTS[*i]),
            },
            Expr::Binary(op, lhs, rhs) => format!(
                "{} {} {}",
                self.operand(*op, lhs, false),
                op.symbol(),
                self.operand(*op, rhs, true)
            ),
            Expr::Call(name, args) => {
                format!("{}({})", name, args.iter().map(|a| self.expr(a)).join(", "))
            }
            Expr::Construct(ty, args) => format!(
                "{}({})",
                self.type_name(*ty),
                args.iter().map(|a| self.expr(a)).join(", ")
            ),
            Expr::Load(buffer, index) => format!("{}[{}]", buffer, self.expr(index)),
        }
    }

    /// Operand of a binary operator, parenthesized when precedence requires
    /// it. Mixed `&&`/`||` and chained comparisons are always parenthesized.
    fn operand(&self, parent: BinOp, e: &Expr, right: bool) -> String {
        let s = self.expr(e);
        let Expr::Binary(op, ..) = e else {
            return s;
        };
        let (p, pp) = (op.precedence(), parent.precedence());
        let wrap = p < pp
            || (p == pp && right && parent.is_left_assoc_only())
            || (p == pp && matches!(parent, BinOp::Lt | BinOp::Ge))
            || (op.is_logical() && parent.is_logical() && *op != parent);
        if wrap {
            format!("({})", s)
        } else {
            s
        }
    }

    fn stmt(&self, s: &Stmt, depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        match s {
            Stmt::Let { name, ty, value } => {
                out.push_str(&format!(
                    "{}{}\n",
                    pad,
                    self.declaration(false, name, *ty, &self.expr(value))
                ));
            }
            Stmt::Var { name, ty, value } => {
                out.push_str(&format!(
                    "{}{}\n",
                    pad,
                    self.declaration(true, name, *ty, &self.expr(value))
                ));
            }
            Stmt::Assign { name, value } => {
                out.push_str(&format!("{}{} = {};\n", pad, name, self.expr(value)));
            }
            Stmt::If { cond, body } => {
                out.push_str(&format!("{}if ({}) {{\n", pad, self.expr(cond)));
                self.block(body, depth + 1, out);
                out.push_str(&format!("{}}}\n", pad));
            }
            Stmt::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let header =
                    self.for_header(var, &self.expr(start), &self.expr(end), &self.expr(step));
                out.push_str(&format!("{}{} {{\n", pad, header));
                self.block(body, depth + 1, out);
                out.push_str(&format!("{}}}\n", pad));
            }
            Stmt::Continue => out.push_str(&format!("{}continue;\n", pad)),
            Stmt::Return(None) => out.push_str(&format!("{}return;\n", pad)),
            Stmt::Return(Some(e)) => {
                out.push_str(&format!("{}return {};\n", pad, self.expr(e)));
            }
            Stmt::Expr(e) => out.push_str(&format!("{}{};\n", pad, self.expr(e))),
        }
    }

    fn block(&self, body: &[Stmt], depth: usize, out: &mut String) {
        for s in body {
            self.stmt(s, depth, out);
        }
    }

    fn function(&self, f: &Function) -> String {
        let mut out = format!("{} {{\n", self.function_header(f));
        self.block(&f.body, 1, &mut out);
        out.push_str("}\n");
        out
    }

    fn module(&self, m: &ShaderModule) -> String {
        m.functions.iter().map(|f| self.function(f)).join("\n")
    }
}
