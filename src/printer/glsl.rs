use itertools::Itertools;

use super::{ShaderPrinter, COMPONENTS};
use crate::ir::{Function, Type};

/// GLSL 450. Uniforms live in an anonymous block, so members are bare names.
pub struct GlslPrinter;

impl ShaderPrinter for GlslPrinter {
    fn type_name(&self, ty: Type) -> String {
        match ty {
            Type::Int => "int".into(),
            Type::Float => "float".into(),
            Type::Bool => "bool".into(),
            Type::IVec(n) => format!("ivec{}", n),
            Type::Void => "void".into(),
        }
    }

    fn uniform(&self, name: &str) -> String {
        name.to_string()
    }

    fn invocation_id(&self, axis: usize) -> String {
        format!("int(gl_GlobalInvocationID.{})", COMPONENTS[axis])
    }

    fn declaration(&self, _mutable: bool, name: &str, ty: Type, value: &str) -> String {
        format!("{} {} = {};", self.type_name(ty), name, value)
    }

    fn for_header(&self, var: &str, start: &str, end: &str, step: &str) -> String {
        format!(
            "for (int {var} = {start}; {var} < {end}; {var} += {step})",
            var = var,
            start = start,
            end = end,
            step = step
        )
    }

    fn function_header(&self, f: &Function) -> String {
        format!(
            "{} {}({})",
            self.type_name(f.ret),
            f.name,
            f.params
                .iter()
                .map(|p| format!("{} {}", self.type_name(p.ty), p.name))
                .join(", ")
        )
    }

    fn uniform_layout(&self, members: &[(&str, Type)]) -> String {
        members
            .iter()
            .map(|(name, ty)| format!("{} {};", self.type_name(*ty), name))
            .join(" ")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Expr, Param, Stmt};

    #[test]
    fn function_layout() {
        let f = Function {
            name: "getValue".into(),
            params: vec![Param::new("xR", Type::Int), Param::new("xC", Type::Int)],
            ret: Type::Float,
            body: vec![
                Stmt::If {
                    cond: Expr::var("xC").lt(Expr::Int(0)),
                    body: vec![Stmt::Return(Some(Expr::Float(0.0)))],
                },
                Stmt::Return(Some(Expr::load("x", Expr::var("xR") * Expr::Int(4) + Expr::var("xC")))),
            ],
        };
        assert_eq!(
            GlslPrinter.function(&f),
            "float getValue(int xR, int xC) {\n    if (xC < 0) {\n        return 0.0;\n    }\n    return x[xR * 4 + xC];\n}\n"
        );
    }

    #[test]
    fn loops_and_ids() {
        let mut out = String::new();
        GlslPrinter.stmt(
            &Stmt::For {
                var: "wR".into(),
                start: Expr::Int(0),
                end: Expr::Int(3),
                step: Expr::Int(2),
                body: vec![Stmt::Continue],
            },
            0,
            &mut out,
        );
        assert_eq!(out, "for (int wR = 0; wR < 3; wR += 2) {\n    continue;\n}\n");
        assert_eq!(
            GlslPrinter.expr(&Expr::InvocationId(2)),
            "int(gl_GlobalInvocationID.z)"
        );
        assert_eq!(
            GlslPrinter.uniform_layout(&[("xShape", Type::IVec(4)), ("pad", Type::IVec(2))]),
            "ivec4 xShape; ivec2 pad;"
        );
    }
}
