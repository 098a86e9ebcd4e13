use include_dir::{include_dir, Dir};
use serde::Serialize;

use crate::errors::PoolgenError::Template;
use crate::errors::Result;
use crate::ops::GeneratedProgram;
use crate::printer::Dialect;

static SHADER_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/shader");

pub fn entry_point(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Glsl => "main",
        Dialect::Wgsl => "compute_main",
    }
}

/// A tera template from the embedded `shader/` directory plus the values to
/// render it with.
pub struct ShaderTemplate {
    name: String,
    context: tera::Context,
}

impl ShaderTemplate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            context: tera::Context::new(),
        }
    }

    pub fn push_attr<T: Serialize + ?Sized>(&mut self, key: &str, val: &T) {
        self.context.insert(key, val);
    }

    pub fn render(&self) -> Result<String> {
        let source = SHADER_DIR
            .get_file(&self.name)
            .and_then(|f| f.contents_utf8())
            .ok_or_else(|| Template(format!("shader template `{}` not found", self.name)))?;
        let mut tera = tera::Tera::default();
        tera.add_raw_template(&self.name, source)
            .map_err(|e| Template(e.to_string()))?;
        tera.render(&self.name, &self.context)
            .map_err(|e| Template(e.to_string()))
    }
}

/// Wraps the program's source with the declarations it expects to find: the
/// input buffers, the `result` output buffer, the uniform block,
/// `getFlatIndex`, `setOutput` and, where the dialect needs one, an entry
/// point calling `main()`.
///
/// Bindings are the inputs in `variable_names` order, then the output, then
/// the uniforms.
pub fn render_module(program: &GeneratedProgram) -> Result<String> {
    let mut templ = ShaderTemplate::new(&format!("prelude.{}", program.dialect.extension()));
    let n_inputs = program.variable_names.len();

    templ.push_attr("input_names", &program.variable_names);
    templ.push_attr("output_binding", &n_inputs);
    templ.push_attr("uniform_binding", &(n_inputs + 1));
    templ.push_attr("uniforms", &program.uniforms);
    templ.push_attr("wg_x", &program.workgroup_size[0]);
    templ.push_attr("wg_y", &program.workgroup_size[1]);
    templ.push_attr("wg_z", &program.workgroup_size[2]);
    templ.push_attr("entry_point", entry_point(program.dialect));
    templ.push_attr("user_code", &program.source);

    templ.render()
}
