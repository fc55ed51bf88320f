use gl::types::{GLchar, GLenum, GLint, GLsizei, GLuint};
use std::ffi::CStr;
use std::ptr;

/// The driver entry points used by this crate. Shader and program objects
/// borrow a context implementation instead of reaching for ambient GL
/// state, so every driver-facing behavior can run against a mock.
///
/// All calls must happen on the thread that owns the current GL context;
/// the driver enforces this, not the trait.
pub trait GlContext {
    fn create_shader(&self, kind: GLenum) -> GLuint;
    fn shader_source(&self, shader: GLuint, source: &CStr);
    fn compile_shader(&self, shader: GLuint);
    fn compile_status(&self, shader: GLuint) -> bool;
    /// `None` when the driver has no log for this shader.
    fn shader_info_log(&self, shader: GLuint) -> Option<String>;
    fn delete_shader(&self, shader: GLuint);

    fn create_program(&self) -> GLuint;
    fn attach_shader(&self, program: GLuint, shader: GLuint);
    fn link_program(&self, program: GLuint);
    fn link_status(&self, program: GLuint) -> bool;
    fn program_info_log(&self, program: GLuint) -> Option<String>;
    fn validate_program(&self, program: GLuint);
    fn delete_program(&self, program: GLuint);
    fn use_program(&self, program: GLuint);

    fn uniform_location(&self, program: GLuint, name: &CStr) -> GLint;
    fn uniform_1i(&self, location: GLint, value: i32);
    fn uniform_1f(&self, location: GLint, value: f32);
    fn uniform_3f(&self, location: GLint, x: f32, y: f32, z: f32);
    fn uniform_3fv(&self, location: GLint, value: &[f32; 3]);
    fn uniform_matrix_4fv(&self, location: GLint, value: &[f32; 16]);
}

/// `GlContext` over the `gl` crate's loaded function pointers. The
/// embedder must have called `gl::load_with` against a current context
/// before constructing shaders or programs with this.
pub struct RawGl;

impl GlContext for RawGl {
    fn create_shader(&self, kind: GLenum) -> GLuint {
        unsafe { gl::CreateShader(kind) }
    }

    fn shader_source(&self, shader: GLuint, source: &CStr) {
        unsafe { gl::ShaderSource(shader, 1, &source.as_ptr(), ptr::null()) }
    }

    fn compile_shader(&self, shader: GLuint) {
        unsafe { gl::CompileShader(shader) }
    }

    fn compile_status(&self, shader: GLuint) -> bool {
        let mut status = 0;
        unsafe { gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status) };
        status != 0
    }

    fn shader_info_log(&self, shader: GLuint) -> Option<String> {
        let mut len: GLint = 0;
        unsafe { gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len) };
        if len <= 0 {
            return None;
        }

        let mut buffer = vec![0u8; len as usize];
        let mut written: GLsizei = 0;
        unsafe {
            gl::GetShaderInfoLog(shader, len, &mut written, buffer.as_mut_ptr() as *mut GLchar);
        }
        buffer.truncate(written.max(0) as usize);
        Some(String::from_utf8_lossy(&buffer).trim_end().to_string())
    }

    fn delete_shader(&self, shader: GLuint) {
        unsafe { gl::DeleteShader(shader) }
    }

    fn create_program(&self) -> GLuint {
        unsafe { gl::CreateProgram() }
    }

    fn attach_shader(&self, program: GLuint, shader: GLuint) {
        unsafe { gl::AttachShader(program, shader) }
    }

    fn link_program(&self, program: GLuint) {
        unsafe { gl::LinkProgram(program) }
    }

    fn link_status(&self, program: GLuint) -> bool {
        let mut status = 0;
        unsafe { gl::GetProgramiv(program, gl::LINK_STATUS, &mut status) };
        status != 0
    }

    fn program_info_log(&self, program: GLuint) -> Option<String> {
        let mut len: GLint = 0;
        unsafe { gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len) };
        if len <= 0 {
            return None;
        }

        let mut buffer = vec![0u8; len as usize];
        let mut written: GLsizei = 0;
        unsafe {
            gl::GetProgramInfoLog(program, len, &mut written, buffer.as_mut_ptr() as *mut GLchar);
        }
        buffer.truncate(written.max(0) as usize);
        Some(String::from_utf8_lossy(&buffer).trim_end().to_string())
    }

    fn validate_program(&self, program: GLuint) {
        unsafe { gl::ValidateProgram(program) }
    }

    fn delete_program(&self, program: GLuint) {
        unsafe { gl::DeleteProgram(program) }
    }

    fn use_program(&self, program: GLuint) {
        unsafe { gl::UseProgram(program) }
    }

    fn uniform_location(&self, program: GLuint, name: &CStr) -> GLint {
        unsafe { gl::GetUniformLocation(program, name.as_ptr()) }
    }

    fn uniform_1i(&self, location: GLint, value: i32) {
        unsafe { gl::Uniform1i(location, value) }
    }

    fn uniform_1f(&self, location: GLint, value: f32) {
        unsafe { gl::Uniform1f(location, value) }
    }

    fn uniform_3f(&self, location: GLint, x: f32, y: f32, z: f32) {
        unsafe { gl::Uniform3f(location, x, y, z) }
    }

    fn uniform_3fv(&self, location: GLint, value: &[f32; 3]) {
        unsafe { gl::Uniform3fv(location, 1, value.as_ptr()) }
    }

    fn uniform_matrix_4fv(&self, location: GLint, value: &[f32; 16]) {
        unsafe { gl::UniformMatrix4fv(location, 1, gl::FALSE, value.as_ptr()) }
    }
}
