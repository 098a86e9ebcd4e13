//! Compute-shader generator for 2D max pooling.
//!
//! [`build`] turns a [`PoolingGeometry`] into a [`GeneratedProgram`]: the
//! number of workgroups to dispatch, the program text, and the buffers and
//! uniforms the host has to bind. The program is built as IR ([`ir`]) and
//! printed as GLSL or WGSL ([`printer`]); [`shader::render_module`] adds the
//! declarations a host backend would provide, [`eval`] runs it on the CPU and
//! [`gpu::GPUExecutor`] runs it through wgpu.

pub mod dispatch;
pub mod errors;
pub mod eval;
pub mod geometry;
pub mod gpu;
pub mod ir;
pub mod ops;
pub mod printer;
pub mod shader;
pub mod utils;

pub use dispatch::{DispatchLayout, DispatchPlan};
pub use errors::{PoolgenError, Result};
pub use geometry::PoolingGeometry;
pub use ops::maxpool::{MaxPoolOp, Uniforms};
pub use ops::{Compile, GeneratedProgram, GeneratorConfig};
pub use printer::Dialect;

/// Builds the max-pool program for `geometry` with the default layout, tile
/// size and dialect.
pub fn build(geometry: &PoolingGeometry) -> Result<GeneratedProgram> {
    build_with_config(geometry, &GeneratorConfig::default())
}

pub fn build_with_config(
    geometry: &PoolingGeometry,
    config: &GeneratorConfig,
) -> Result<GeneratedProgram> {
    MaxPoolOp::with_config(geometry.clone(), config).compile(config.dialect)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_defaults() -> anyhow::Result<()> {
        let geometry = PoolingGeometry::from_json(
            r#"{
                "in_shape": [2, 8, 8, 4],
                "out_shape": [2, 4, 4, 4],
                "stride_height": 2,
                "stride_width": 2,
                "dilation_height": 1,
                "dilation_width": 1,
                "pad_top": 0,
                "pad_left": 0,
                "effective_filter_height": 2,
                "effective_filter_width": 2
            }"#,
        )?;
        let program = build(&geometry)?;
        assert_eq!(program.dialect, Dialect::Glsl);
        assert_eq!(program.dispatch, [2, 2, 8]);
        assert!(program.source.contains("int d0 = index2 / outShape.w;"));

        let config = GeneratorConfig {
            dialect: Dialect::Wgsl,
            ..GeneratorConfig::default()
        };
        let program = build_with_config(&geometry, &config)?;
        assert!(program
            .source
            .contains("let d0: i32 = index2 / uniforms.outShape.w;"));
        Ok(())
    }

    #[test]
    fn program_serializes_metadata() -> anyhow::Result<()> {
        let geometry = PoolingGeometry {
            in_shape: vec![1, 4, 4, 1],
            out_shape: vec![1, 2, 2, 1],
            stride_height: 2,
            stride_width: 2,
            dilation_height: 1,
            dilation_width: 1,
            pad_top: 0,
            pad_left: 0,
            effective_filter_height: 2,
            effective_filter_width: 2,
        };
        let json: serde_json::Value = serde_json::to_value(build(&geometry)?)?;
        assert_eq!(json["dispatch"], serde_json::json!([1, 1, 1]));
        assert_eq!(json["variable_names"], serde_json::json!(["x"]));
        assert_eq!(json["dialect"], serde_json::json!("Glsl"));
        assert!(json.get("module").is_none());
        Ok(())
    }
}
