use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::dispatch::{DispatchLayout, DispatchPlan};
use crate::errors::PoolgenError::InvalidGeometry;
use crate::errors::Result;
use crate::eval::Value;
use crate::geometry::PoolingGeometry;
use crate::ir::{Expr, Function, Param, ShaderModule, Stmt, Type, FLAT_INDEX_FN, MAX_FN, SET_OUTPUT_FN};
use crate::printer::Dialect;

use super::coords::{invocation_ids, output_coords_fn, OUTPUT_COORDS_FN};
use super::{Compile, GeneratedProgram, GeneratorConfig};

pub const INPUT_BUFFER: &str = "x";
pub const MAIN_FN: &str = "main";
const GET_VALUE_FN: &str = "getValue";

pub const UNIFORM_MEMBERS: [(&str, Type); 4] = [
    ("xShape", Type::IVec(4)),
    ("outShape", Type::IVec(4)),
    ("pad", Type::IVec(2)),
    ("stride", Type::IVec(2)),
];

/// Uniform block of the max-pool program. Laid out to match both the GLSL
/// std140 block and the WGSL uniform struct (48 bytes, no padding).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Uniforms {
    pub x_shape: [i32; 4],
    pub out_shape: [i32; 4],
    pub pad: [i32; 2],
    pub stride: [i32; 2],
}

impl Uniforms {
    /// Fails if any shape, padding or stride value does not fit in an `i32`.
    pub fn from_geometry(geometry: &PoolingGeometry) -> Result<Self> {
        let shape4 = |s: &[i64]| -> Result<[i32; 4]> {
            let mut res = [0i32; 4];
            for (r, v) in res.iter_mut().zip(s) {
                *r = to_i32(*v)?;
            }
            Ok(res)
        };
        Ok(Self {
            x_shape: shape4(&geometry.in_shape)?,
            out_shape: shape4(&geometry.out_shape)?,
            pad: [to_i32(geometry.pad_top)?, to_i32(geometry.pad_left)?],
            stride: [to_i32(geometry.stride_height)?, to_i32(geometry.stride_width)?],
        })
    }

    /// Member values keyed by their names in [`UNIFORM_MEMBERS`].
    pub fn values(&self) -> Vec<(&'static str, Value)> {
        let ivec = |v: &[i32]| Value::IVec(v.iter().map(|c| *c as i64).collect());
        vec![
            (UNIFORM_MEMBERS[0].0, ivec(&self.x_shape)),
            (UNIFORM_MEMBERS[1].0, ivec(&self.out_shape)),
            (UNIFORM_MEMBERS[2].0, ivec(&self.pad)),
            (UNIFORM_MEMBERS[3].0, ivec(&self.stride)),
        ]
    }
}

fn to_i32(v: i64) -> Result<i32> {
    i32::try_from(v).map_err(|_| InvalidGeometry(format!("{} does not fit in a 32-bit uniform", v)))
}

/// 2D max pooling over an NHWC tensor. Each invocation produces one output
/// element.
///
/// Rows of the window that fall outside the input are skipped, while columns
/// outside the input read as 0.0, and the running maximum starts at 0.0. A
/// window lying entirely in the row padding, or holding only negative values,
/// therefore yields 0.0.
#[derive(Debug, Clone, Serialize)]
pub struct MaxPoolOp {
    geometry: PoolingGeometry,
    layout: DispatchLayout,
    tile_size: [u32; 3],
}

impl MaxPoolOp {
    pub fn new(geometry: PoolingGeometry) -> Self {
        Self::with_config(geometry, &GeneratorConfig::default())
    }

    pub fn with_config(geometry: PoolingGeometry, config: &GeneratorConfig) -> Self {
        Self {
            geometry,
            layout: config.layout.clone(),
            tile_size: config.tile_size,
        }
    }

    pub fn geometry(&self) -> &PoolingGeometry {
        &self.geometry
    }

    pub fn plan(&self) -> Result<DispatchPlan> {
        self.geometry.check_rank()?;
        self.geometry.check_window()?;
        DispatchPlan::new(self.layout.clone(), self.tile_size, &self.geometry.out_shape)
    }

    pub fn build_module(&self) -> Result<ShaderModule> {
        self.geometry.check_rank()?;
        self.geometry.check_window()?;
        let rank = self.geometry.out_shape.len();
        let coords_fn = output_coords_fn(
            &self.layout,
            rank,
            invocation_ids(),
            &Expr::uniform("outShape"),
        )?;
        Ok(ShaderModule {
            functions: vec![coords_fn, self.get_value_fn()?, self.main_fn(rank)?],
        })
    }

    /// Input element at (batch, xR, xC, d); columns outside the input are 0.0.
    fn get_value_fn(&self) -> Result<Function> {
        let x_c = || Expr::var("xC");
        Ok(Function {
            name: GET_VALUE_FN.to_string(),
            params: ["batch", "xR", "xC", "d"]
                .iter()
                .map(|n| Param::new(n, Type::Int))
                .collect(),
            ret: Type::Float,
            body: vec![
                Stmt::If {
                    cond: x_c()
                        .lt(Expr::Int(0))
                        .or(x_c().ge(Expr::Int(self.geometry.in_width()?))),
                    body: vec![Stmt::Return(Some(Expr::Float(0.0)))],
                },
                Stmt::Return(Some(Expr::load(
                    INPUT_BUFFER,
                    Expr::call(
                        FLAT_INDEX_FN,
                        vec![
                            Expr::Construct(
                                Type::IVec(4),
                                vec![Expr::var("batch"), Expr::var("xR"), x_c(), Expr::var("d")],
                            ),
                            Expr::uniform("xShape"),
                        ],
                    ),
                ))),
            ],
        })
    }

    fn main_fn(&self, rank: usize) -> Result<Function> {
        let g = &self.geometry;
        let coords = || Expr::var("coords");
        let out_shape = || Expr::uniform("outShape");

        let out_of_bounds = (0..rank)
            .map(|i| coords().component(i).ge(out_shape().component(i)))
            .reduce(|acc, e| acc.or(e))
            .unwrap_or(Expr::Int(0).lt(Expr::Int(0)));

        let inner = Stmt::For {
            var: "wC".into(),
            start: Expr::Int(0),
            end: Expr::Int(g.effective_filter_width),
            step: Expr::Int(g.dilation_width),
            body: vec![
                Stmt::let_("xC", Type::Int, Expr::var("xCCorner") + Expr::var("wC")),
                Stmt::let_(
                    "value",
                    Type::Float,
                    Expr::call(
                        GET_VALUE_FN,
                        vec![
                            Expr::var("batch"),
                            Expr::var("xR"),
                            Expr::var("xC"),
                            Expr::var("d"),
                        ],
                    ),
                ),
                Stmt::assign(
                    "minMaxValue",
                    Expr::call(MAX_FN, vec![Expr::var("value"), Expr::var("minMaxValue")]),
                ),
            ],
        };

        let outer = Stmt::For {
            var: "wR".into(),
            start: Expr::Int(0),
            end: Expr::Int(g.effective_filter_height),
            step: Expr::Int(g.dilation_height),
            body: vec![
                Stmt::let_("xR", Type::Int, Expr::var("xRCorner") + Expr::var("wR")),
                Stmt::If {
                    cond: Expr::var("xR")
                        .lt(Expr::Int(0))
                        .or(Expr::var("xR").ge(Expr::Int(g.in_height()?))),
                    body: vec![Stmt::Continue],
                },
                inner,
            ],
        };

        Ok(Function {
            name: MAIN_FN.to_string(),
            params: vec![],
            ret: Type::Void,
            body: vec![
                Stmt::let_(
                    "coords",
                    Type::coords(rank)?,
                    Expr::call(OUTPUT_COORDS_FN, vec![]),
                ),
                Stmt::let_("batch", Type::Int, coords().component(0)),
                Stmt::let_("d", Type::Int, coords().component(3)),
                Stmt::If {
                    cond: out_of_bounds,
                    body: vec![Stmt::Return(None)],
                },
                Stmt::let_(
                    "xRCorner",
                    Type::Int,
                    coords().component(1) * Expr::uniform("stride").component(0)
                        - Expr::uniform("pad").component(0),
                ),
                Stmt::let_(
                    "xCCorner",
                    Type::Int,
                    coords().component(2) * Expr::uniform("stride").component(1)
                        - Expr::uniform("pad").component(1),
                ),
                Stmt::var("minMaxValue", Type::Float, Expr::Float(0.0)),
                outer,
                Stmt::Expr(Expr::call(
                    SET_OUTPUT_FN,
                    vec![
                        Expr::call(FLAT_INDEX_FN, vec![coords(), out_shape()]),
                        Expr::var("minMaxValue"),
                    ],
                )),
            ],
        })
    }
}

impl Compile for MaxPoolOp {
    fn compile(&self, dialect: Dialect) -> Result<GeneratedProgram> {
        let plan = self.plan()?;
        let module = self.build_module()?;
        Ok(GeneratedProgram::assemble(
            module,
            plan,
            self.geometry.out_shape.clone(),
            &[INPUT_BUFFER],
            &UNIFORM_MEMBERS,
            dialect,
        ))
    }

    fn compute_num_workgroups(&self) -> Result<[u32; 3]> {
        Ok(self.plan()?.dispatch)
    }
}
