//! Structured form of a generated compute program.
//!
//! Generators build a [`ShaderModule`] out of [`Function`]s, [`Stmt`]s and
//! [`Expr`]s. Printers in [`crate::printer`] turn it into GLSL or WGSL text and
//! [`crate::eval`] runs it on the CPU, so the index arithmetic can be checked
//! without a GPU or a shading-language parser.

use std::ops;

use crate::errors::PoolgenError::UnsupportedRank;
use crate::errors::Result;

/// Flat index of a coordinate under a shape, provided by the module prelude.
pub const FLAT_INDEX_FN: &str = "getFlatIndex";
/// Writes one value of the output buffer, provided by the module prelude.
pub const SET_OUTPUT_FN: &str = "setOutput";
pub const MAX_FN: &str = "max";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    /// Integer vector with 2 to 4 components.
    IVec(u8),
    Void,
}

impl Type {
    /// Type holding a coordinate of a tensor of the given rank.
    pub fn coords(rank: usize) -> Result<Type> {
        match rank {
            1 => Ok(Type::Int),
            2..=4 => Ok(Type::IVec(rank as u8)),
            _ => Err(UnsupportedRank(rank)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Lt | BinOp::Ge => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div => 5,
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// `a op (b op c)` differs from `(a op b) op c`.
    pub fn is_left_assoc_only(self) -> bool {
        matches!(self, BinOp::Sub | BinOp::Div | BinOp::Lt | BinOp::Ge)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f32),
    Var(String),
    /// Member of the uniform block bound next to the buffers.
    Uniform(String),
    /// Component of the global invocation id, cast to `int`.
    InvocationId(usize),
    Component(Box<Expr>, usize),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Construct(Type, Vec<Expr>),
    /// Read of a storage buffer element.
    Load(String, Box<Expr>),
}

impl Expr {
    pub fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    pub fn uniform(name: &str) -> Expr {
        Expr::Uniform(name.to_string())
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(name.to_string(), args)
    }

    pub fn load(buffer: &str, index: Expr) -> Expr {
        Expr::Load(buffer.to_string(), Box::new(index))
    }

    pub fn component(self, i: usize) -> Expr {
        Expr::Component(Box::new(self), i)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Lt, self, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Ge, self, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Or, self, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::And, self, rhs)
    }
}

macro_rules! impl_arith {
    ($($trait:ident, $method:ident, $op:ident);*) => {
        $(
            impl ops::$trait for Expr {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    Expr::binary(BinOp::$op, self, rhs)
                }
            }
        )*
    };
}

impl_arith!(Add, add, Add; Sub, sub, Sub; Mul, mul, Mul; Div, div, Div);

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, ty: Type, value: Expr },
    Var { name: String, ty: Type, value: Expr },
    Assign { name: String, value: Expr },
    If { cond: Expr, body: Vec<Stmt> },
    /// `for (var = start; var < end; var += step)`
    For {
        var: String,
        start: Expr,
        end: Expr,
        step: Expr,
        body: Vec<Stmt>,
    },
    Continue,
    Return(Option<Expr>),
    Expr(Expr),
}

impl Stmt {
    pub fn let_(name: &str, ty: Type, value: Expr) -> Stmt {
        Stmt::Let {
            name: name.to_string(),
            ty,
            value,
        }
    }

    pub fn var(name: &str, ty: Type, value: Expr) -> Stmt {
        Stmt::Var {
            name: name.to_string(),
            ty,
            value,
        }
    }

    pub fn assign(name: &str, value: Expr) -> Stmt {
        Stmt::Assign {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Vec<Stmt>,
}

/// Functions in declaration order; callees come before their callers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderModule {
    pub functions: Vec<Function>,
}

impl ShaderModule {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coords_type_by_rank() {
        assert_eq!(Type::coords(1), Ok(Type::Int));
        assert_eq!(Type::coords(4), Ok(Type::IVec(4)));
        assert!(Type::coords(0).is_err());
        assert!(Type::coords(5).is_err());
    }

    #[test]
    fn operators_build_trees() {
        let e = Expr::var("a") * Expr::Int(2) - Expr::uniform("pad").component(0);
        assert_eq!(
            e,
            Expr::binary(
                BinOp::Sub,
                Expr::binary(BinOp::Mul, Expr::var("a"), Expr::Int(2)),
                Expr::Component(Box::new(Expr::uniform("pad")), 0),
            )
        );
    }
}
