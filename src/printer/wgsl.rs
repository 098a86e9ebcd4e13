use itertools::Itertools;

use super::{ShaderPrinter, COMPONENTS};
use crate::ir::{Function, Type};

/// WGSL. Uniforms are members of the `uniforms` struct binding and the
/// invocation id is stored in the private `globalId` by the entry point.
pub struct WgslPrinter;

impl ShaderPrinter for WgslPrinter {
    fn type_name(&self, ty: Type) -> String {
        match ty {
            Type::Int => "i32".into(),
            Type::Float => "f32".into(),
            Type::Bool => "bool".into(),
            Type::IVec(n) => format!("vec{}<i32>", n),
            Type::Void => String::new(),
        }
    }

    fn uniform(&self, name: &str) -> String {
        format!("uniforms.{}", name)
    }

    fn invocation_id(&self, axis: usize) -> String {
        format!("i32(globalId.{})", COMPONENTS[axis])
    }

    fn declaration(&self, mutable: bool, name: &str, ty: Type, value: &str) -> String {
        let keyword = if mutable { "var" } else { "let" };
        format!("{} {}: {} = {};", keyword, name, self.type_name(ty), value)
    }

    fn for_header(&self, var: &str, start: &str, end: &str, step: &str) -> String {
        format!(
            "for (var {var}: i32 = {start}; {var} < {end}; {var} = {var} + {step})",
            var = var,
            start = start,
            end = end,
            step = step
        )
    }

    fn function_header(&self, f: &Function) -> String {
        let params = f
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, self.type_name(p.ty)))
            .join(", ");
        match f.ret {
            Type::Void => format!("fn {}({})", f.name, params),
            ret => format!("fn {}({}) -> {}", f.name, params, self.type_name(ret)),
        }
    }

    fn uniform_layout(&self, members: &[(&str, Type)]) -> String {
        members
            .iter()
            .map(|(name, ty)| format!("{} : {},", name, self.type_name(*ty)))
            .join(" ")
    }
}
