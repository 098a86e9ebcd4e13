use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchLayout, DispatchPlan, DEFAULT_TILE_SIZE};
use crate::errors::Result;
use crate::ir::{ShaderModule, Type};
use crate::printer::Dialect;

pub mod coords;
pub mod maxpool;

pub trait Compile {
    fn compile(&self, dialect: Dialect) -> Result<GeneratedProgram>;

    fn compute_num_workgroups(&self) -> Result<[u32; 3]>;
}

/// Knobs of program generation. The defaults produce the max-pool program
/// described by the crate docs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub dialect: Dialect,
    pub tile_size: [u32; 3],
    pub layout: DispatchLayout,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            tile_size: DEFAULT_TILE_SIZE,
            layout: DispatchLayout::pool2d(),
        }
    }
}

/// A compute program ready to be bound and dispatched by a host backend.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedProgram {
    pub out_shape: Vec<i64>,
    pub source: String,
    /// Number of workgroups per axis.
    pub dispatch: [u32; 3],
    pub workgroup_size: [u32; 3],
    /// Input buffers, bound in this order before the output buffer.
    pub variable_names: Vec<String>,
    /// Member declarations of the uniform block, in the program's dialect.
    pub uniforms: String,
    pub dialect: Dialect,
    #[serde(skip)]
    pub module: ShaderModule,
    #[serde(skip)]
    uniform_members: Vec<(&'static str, Type)>,
}

impl GeneratedProgram {
    pub(crate) fn assemble(
        module: ShaderModule,
        plan: DispatchPlan,
        out_shape: Vec<i64>,
        variable_names: &[&str],
        uniform_members: &[(&'static str, Type)],
        dialect: Dialect,
    ) -> Self {
        let printer = dialect.printer();
        let source = printer.module(&module);
        let uniforms = printer.uniform_layout(uniform_members);
        log::debug!("compiled {:?} program:\n{}", dialect, source);
        Self {
            out_shape,
            source,
            dispatch: plan.dispatch,
            workgroup_size: plan.tile_size,
            variable_names: variable_names.iter().map(|s| s.to_string()).collect(),
            uniforms,
            dialect,
            module,
            uniform_members: uniform_members.to_vec(),
        }
    }

    /// Same program printed in another dialect.
    pub fn to_dialect(&self, dialect: Dialect) -> GeneratedProgram {
        let printer = dialect.printer();
        GeneratedProgram {
            source: printer.module(&self.module),
            uniforms: printer.uniform_layout(&self.uniform_members),
            dialect,
            ..self.clone()
        }
    }

    pub fn out_len(&self) -> usize {
        self.out_shape.iter().product::<i64>().max(0) as usize
    }
}
