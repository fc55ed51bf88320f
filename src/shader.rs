use gl::types::{GLenum, GLuint};
use std::ffi::CString;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::context::GlContext;
use crate::error::{Result, ShaderError};
use crate::source::read_shader_source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl ShaderStage {
    pub fn gl_enum(self) -> GLenum {
        match self {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Fragment => gl::FRAGMENT_SHADER,
            ShaderStage::Geometry => gl::GEOMETRY_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
        };
        f.write_str(name)
    }
}

/// One compiled shader stage. A value of this type always holds a live
/// driver object; compilation failures never produce a `Shader`.
#[derive(Debug)]
pub struct Shader<C: GlContext> {
    gl: Arc<C>,
    id: GLuint,
    stage: ShaderStage,
}

impl<C: GlContext> Shader<C> {
    /// Compiles `source` as a shader of the given stage. `label` names
    /// the origin of the source (usually a file path) in diagnostics.
    pub fn from_source(
        gl: Arc<C>,
        stage: ShaderStage,
        source: &str,
        label: Option<&str>,
    ) -> Result<Self> {
        let c_source = CString::new(source.as_bytes())?;

        let id = gl.create_shader(stage.gl_enum());
        if id == 0 {
            return Err(ShaderError::ObjectCreation);
        }

        gl.shader_source(id, &c_source);
        gl.compile_shader(id);

        if !gl.compile_status(id) {
            let message = gl
                .shader_info_log(id)
                .unwrap_or_else(|| String::from("unknown compile error"));
            match label {
                Some(label) => {
                    log::error!("Failed to compile {} shader {}: {}", stage, label, message)
                }
                None => log::error!("Failed to compile {} shader: {}", stage, message),
            }
            gl.delete_shader(id);
            return Err(ShaderError::Compilation(message));
        }

        Ok(Self { gl, id, stage })
    }

    /// Reads the file and compiles it, using the path as the diagnostic
    /// label.
    pub fn from_file<P: AsRef<Path>>(gl: Arc<C>, stage: ShaderStage, path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = read_shader_source(path)?;
        let label = path.display().to_string();
        Self::from_source(gl, stage, &source, Some(&label))
    }

    pub fn id(&self) -> GLuint {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl<C: GlContext> Drop for Shader<C> {
    fn drop(&mut self) {
        self.gl.delete_shader(self.id);
    }
}
