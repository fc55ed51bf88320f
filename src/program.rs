use gl::types::{GLint, GLuint};
use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use crate::context::GlContext;
use crate::error::{Result, ShaderError};
use crate::shader::{Shader, ShaderStage};
use crate::source::read_shader_source;

/// A linked shader program. Holds the driver program object and a cache
/// of uniform locations looked up so far.
#[derive(Debug)]
pub struct ShaderProgram<C: GlContext> {
    gl: Arc<C>,
    id: GLuint,
    uniforms: HashMap<String, GLint>,
}

impl<C: GlContext> ShaderProgram<C> {
    /// Links a vertex + fragment program from source files.
    pub fn new<P, Q>(gl: Arc<C>, vertex_path: P, fragment_path: Q) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let vertex_source = read_shader_source(vertex_path.as_ref())?;
        let fragment_source = read_shader_source(fragment_path.as_ref())?;
        let vertex_label = vertex_path.as_ref().display().to_string();
        let fragment_label = fragment_path.as_ref().display().to_string();

        let id = Self::link_stages(
            &gl,
            &[
                (
                    ShaderStage::Vertex,
                    vertex_source.as_str(),
                    Some(vertex_label.as_str()),
                ),
                (
                    ShaderStage::Fragment,
                    fragment_source.as_str(),
                    Some(fragment_label.as_str()),
                ),
            ],
        )?;
        Ok(Self {
            gl,
            id,
            uniforms: HashMap::new(),
        })
    }

    /// Links a vertex + geometry + fragment program from source files.
    pub fn with_geometry<P, Q, R>(
        gl: Arc<C>,
        vertex_path: P,
        geometry_path: Q,
        fragment_path: R,
    ) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        R: AsRef<Path>,
    {
        let vertex_source = read_shader_source(vertex_path.as_ref())?;
        let fragment_source = read_shader_source(fragment_path.as_ref())?;
        let geometry_source = read_shader_source(geometry_path.as_ref())?;
        let vertex_label = vertex_path.as_ref().display().to_string();
        let fragment_label = fragment_path.as_ref().display().to_string();
        let geometry_label = geometry_path.as_ref().display().to_string();

        let id = Self::link_stages(
            &gl,
            &[
                (
                    ShaderStage::Vertex,
                    vertex_source.as_str(),
                    Some(vertex_label.as_str()),
                ),
                (
                    ShaderStage::Fragment,
                    fragment_source.as_str(),
                    Some(fragment_label.as_str()),
                ),
                (
                    ShaderStage::Geometry,
                    geometry_source.as_str(),
                    Some(geometry_label.as_str()),
                ),
            ],
        )?;
        Ok(Self {
            gl,
            id,
            uniforms: HashMap::new(),
        })
    }

    /// Links a vertex + fragment program from in-memory sources.
    pub fn from_source(gl: Arc<C>, vertex_source: &str, fragment_source: &str) -> Result<Self> {
        let id = Self::link_stages(
            &gl,
            &[
                (ShaderStage::Vertex, vertex_source, None),
                (ShaderStage::Fragment, fragment_source, None),
            ],
        )?;
        Ok(Self {
            gl,
            id,
            uniforms: HashMap::new(),
        })
    }

    /// Links a vertex + geometry + fragment program from in-memory
    /// sources.
    pub fn with_geometry_from_source(
        gl: Arc<C>,
        vertex_source: &str,
        geometry_source: &str,
        fragment_source: &str,
    ) -> Result<Self> {
        let id = Self::link_stages(
            &gl,
            &[
                (ShaderStage::Vertex, vertex_source, None),
                (ShaderStage::Fragment, fragment_source, None),
                (ShaderStage::Geometry, geometry_source, None),
            ],
        )?;
        Ok(Self {
            gl,
            id,
            uniforms: HashMap::new(),
        })
    }

    /// Compiles every requested stage, then attaches and links. Stage
    /// objects are owned `Shader` values, so each one is released exactly
    /// once on every path, including partial compile failures.
    fn link_stages(gl: &Arc<C>, stages: &[(ShaderStage, &str, Option<&str>)]) -> Result<GLuint> {
        let mut compiled = Vec::with_capacity(stages.len());
        for (stage, source, label) in stages {
            compiled.push(Shader::from_source(Arc::clone(gl), *stage, source, *label)?);
        }

        let id = gl.create_program();
        if id == 0 {
            return Err(ShaderError::ObjectCreation);
        }
        for shader in &compiled {
            gl.attach_shader(id, shader.id());
        }
        gl.link_program(id);

        // Stage objects are no longer needed once the program is linked.
        drop(compiled);

        if !gl.link_status(id) {
            let message = gl
                .program_info_log(id)
                .unwrap_or_else(|| String::from("unknown link error"));
            log::error!("Failed to link shader program: {}", message);
            gl.delete_program(id);
            return Err(ShaderError::Linking(message));
        }

        gl.validate_program(id);
        Ok(id)
    }

    pub fn id(&self) -> GLuint {
        self.id
    }

    /// Makes this program current. An id of 0 (after `clear`) is passed
    /// through to the driver unvalidated.
    pub fn bind(&self) {
        self.gl.use_program(self.id);
    }

    /// Deletes the driver program object and resets the id to 0. Safe to
    /// call more than once; deleting id 0 is a driver no-op.
    pub fn clear(&mut self) {
        self.gl.delete_program(self.id);
        self.id = 0;
        self.uniforms.clear();
    }

    /// Looks up a uniform location, caching the result. Returns -1 when
    /// the uniform does not exist or was optimized out; callers must
    /// check for it.
    pub fn get_uniform_location(&mut self, name: &str) -> GLint {
        if let Some(location) = self.uniforms.get(name) {
            return *location;
        }

        let cname = CString::new(name).unwrap();
        let location = self.gl.uniform_location(self.id, &cname);

        if location == -1 {
            log::warn!("Uniform '{}' not found in shader", name);
        }

        self.uniforms.insert(name.to_string(), location);
        location
    }

    // Uniform setters
    pub fn set_uniform_1i(&mut self, name: &str, value: i32) {
        self.bind();
        let location = self.get_uniform_location(name);
        self.gl.uniform_1i(location, value);
    }

    pub fn set_uniform_1f(&mut self, name: &str, value: f32) {
        self.bind();
        let location = self.get_uniform_location(name);
        self.gl.uniform_1f(location, value);
    }

    pub fn set_uniform_3f(&mut self, name: &str, x: f32, y: f32, z: f32) {
        self.bind();
        let location = self.get_uniform_location(name);
        self.gl.uniform_3f(location, x, y, z);
    }

    pub fn set_uniform_vec3(&mut self, name: &str, vec: &[f32; 3]) {
        self.bind();
        let location = self.get_uniform_location(name);
        self.gl.uniform_3fv(location, vec);
    }

    pub fn set_uniform_mat4(&mut self, name: &str, mat: &[f32; 16]) {
        self.bind();
        let location = self.get_uniform_location(name);
        self.gl.uniform_matrix_4fv(location, mat);
    }
}

impl<C: GlContext> Drop for ShaderProgram<C> {
    fn drop(&mut self) {
        self.gl.delete_program(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::mock::MockContext;
    use std::io::Write;

    const VERTEX: &str = "#version 330 core\n\
        layout (location = 0) in vec3 aPos;\n\
        void main() { gl_Position = vec4(aPos, 1.0); }\n";

    const FRAGMENT: &str = "#version 330 core\n\
        out vec4 FragColor;\n\
        uniform vec3 uColor;\n\
        void main() { FragColor = vec4(uColor, 1.0); }\n";

    const GEOMETRY: &str = "#version 330 core\n\
        layout (triangles) in;\n\
        layout (triangle_strip, max_vertices = 3) out;\n\
        void main() {\n\
            for (int i = 0; i < 3; i++) {\n\
                gl_Position = gl_in[i].gl_Position;\n\
                EmitVertex();\n\
            }\n\
            EndPrimitive();\n\
        }\n";

    const BROKEN: &str = "#version 330 core\n#error deliberately broken\n";

    #[test]
    fn links_vertex_and_fragment() {
        let gl = Arc::new(MockContext::new());
        let program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();

        assert_ne!(program.id(), 0);

        let state = gl.state.borrow();
        let attached = &state.attachments[&program.id()];
        assert_eq!(attached.len(), 2);
        assert_eq!(state.shader_kinds[&attached[0]], gl::VERTEX_SHADER);
        assert_eq!(state.shader_kinds[&attached[1]], gl::FRAGMENT_SHADER);
        assert!(state.linked.contains(&program.id()));
        assert!(state.validated.contains(&program.id()));
        // Both stage objects were released exactly once, after linking.
        drop(state);
        assert_eq!(gl.deleted_count(1), 1);
        assert_eq!(gl.deleted_count(2), 1);
    }

    #[test]
    fn geometry_path_attaches_three_stages() {
        let gl = Arc::new(MockContext::new());
        let program =
            ShaderProgram::with_geometry_from_source(Arc::clone(&gl), VERTEX, GEOMETRY, FRAGMENT)
                .unwrap();

        let state = gl.state.borrow();
        let attached = &state.attachments[&program.id()];
        assert_eq!(attached.len(), 3);
        assert_eq!(state.shader_kinds[&attached[0]], gl::VERTEX_SHADER);
        assert_eq!(state.shader_kinds[&attached[1]], gl::FRAGMENT_SHADER);
        assert_eq!(state.shader_kinds[&attached[2]], gl::GEOMETRY_SHADER);
        drop(state);

        for id in 1..=3 {
            assert_eq!(gl.deleted_count(id), 1);
        }
    }

    #[test]
    fn compile_failure_aborts_before_attach_and_releases_siblings() {
        let gl = Arc::new(MockContext::new());
        let err = ShaderProgram::with_geometry_from_source(Arc::clone(&gl), VERTEX, BROKEN, FRAGMENT)
            .unwrap_err();

        assert!(matches!(err, ShaderError::Compilation(_)));

        let state = gl.state.borrow();
        // No program object was created, so nothing was attached.
        assert!(state.attachments.is_empty());
        assert!(state.linked.is_empty());
        drop(state);

        // Vertex (1), fragment (2) and the failed geometry stage (3) are
        // all released exactly once.
        for id in 1..=3 {
            assert_eq!(gl.deleted_count(id), 1);
        }
    }

    #[test]
    fn link_failure_releases_program_and_stages() {
        let gl = Arc::new(MockContext::new().with_link_failure());
        let err = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap_err();

        match err {
            ShaderError::Linking(message) => assert!(message.contains("failed to link")),
            other => panic!("unexpected error: {:?}", other),
        }

        let state = gl.state.borrow();
        // Program handle 3 follows the two stage handles.
        assert_eq!(state.deleted_programs, vec![3]);
        assert!(state.validated.is_empty());
        drop(state);
        assert_eq!(gl.deleted_count(1), 1);
        assert_eq!(gl.deleted_count(2), 1);
    }

    #[test]
    fn link_failure_without_driver_log() {
        let gl = Arc::new(MockContext::new().with_link_failure().with_silent_logs());
        let err = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap_err();

        match err {
            ShaderError::Linking(message) => assert_eq!(message, "unknown link error"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn bind_makes_the_program_current() {
        let gl = Arc::new(MockContext::new());
        let program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();

        program.bind();
        assert_eq!(gl.state.borrow().bound, vec![program.id()]);
    }

    #[test]
    fn clear_resets_the_handle_and_stays_usable() {
        let gl = Arc::new(MockContext::new().with_uniform("uColor", 4));
        let mut program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();
        let id = program.id();

        program.clear();
        assert_eq!(program.id(), 0);
        assert_eq!(gl.state.borrow().deleted_programs, vec![id]);

        // Still callable after clear: bind passes 0 through, lookups miss.
        program.bind();
        assert_eq!(program.get_uniform_location("uColor"), -1);
        assert_eq!(*gl.state.borrow().bound.last().unwrap(), 0);

        // Second clear and the eventual drop are no-ops on id 0.
        program.clear();
        drop(program);
        assert_eq!(gl.state.borrow().deleted_programs, vec![id]);
    }

    #[test]
    fn drop_releases_the_program() {
        let gl = Arc::new(MockContext::new());
        let program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();
        let id = program.id();
        drop(program);

        assert_eq!(gl.state.borrow().deleted_programs, vec![id]);
    }

    #[test]
    fn uniform_lookup_returns_location_and_caches() {
        let gl = Arc::new(MockContext::new().with_uniform("uColor", 4));
        let mut program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();

        assert_eq!(program.get_uniform_location("uColor"), 4);
        assert_eq!(program.get_uniform_location("uColor"), 4);
        // The second lookup is served from the cache.
        assert_eq!(gl.state.borrow().location_queries.len(), 1);
    }

    #[test]
    fn unknown_uniform_returns_sentinel() {
        let gl = Arc::new(MockContext::new());
        let mut program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();

        assert_eq!(program.get_uniform_location("uMissing"), -1);
    }

    #[test]
    fn setters_bind_then_write_through_the_cache() {
        let gl = Arc::new(MockContext::new().with_uniform("uColor", 4));
        let mut program = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();

        program.set_uniform_3f("uColor", 1.0, 0.5, 0.25);
        program.set_uniform_1i("uColor", 7);

        let state = gl.state.borrow();
        assert_eq!(state.bound, vec![program.id(), program.id()]);
        assert_eq!(
            state.uniform_writes,
            vec![(4, "3f:1,0.5,0.25".to_string()), (4, "1i:7".to_string())]
        );
        assert_eq!(state.location_queries.len(), 1);
    }

    #[test]
    fn same_sources_link_into_distinct_programs() {
        let gl = Arc::new(MockContext::new());
        let mut first = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();
        let mut second = ShaderProgram::from_source(Arc::clone(&gl), VERTEX, FRAGMENT).unwrap();

        assert_ne!(first.id(), 0);
        assert_ne!(second.id(), 0);
        assert_ne!(first.id(), second.id());

        first.bind();
        second.bind();
        first.clear();
        second.clear();

        let state = gl.state.borrow();
        assert_eq!(state.deleted_programs.len(), 2);
    }

    #[test]
    fn file_constructor_reads_compiles_and_links() {
        let gl = Arc::new(MockContext::new());
        let mut vertex_file = tempfile::NamedTempFile::new().unwrap();
        let mut fragment_file = tempfile::NamedTempFile::new().unwrap();
        write!(vertex_file, "{}", VERTEX).unwrap();
        write!(fragment_file, "{}", FRAGMENT).unwrap();

        let program =
            ShaderProgram::new(Arc::clone(&gl), vertex_file.path(), fragment_file.path()).unwrap();
        assert_ne!(program.id(), 0);
    }

    #[test]
    fn file_constructor_fails_on_missing_file_without_driver_calls() {
        let gl = Arc::new(MockContext::new());
        let dir = tempfile::tempdir().unwrap();
        let mut vertex_file = tempfile::NamedTempFile::new().unwrap();
        write!(vertex_file, "{}", VERTEX).unwrap();

        let err = ShaderProgram::new(
            Arc::clone(&gl),
            vertex_file.path(),
            dir.path().join("missing.frag"),
        )
        .unwrap_err();

        assert!(matches!(err, ShaderError::FileRead { .. }));
        assert!(gl.state.borrow().shader_kinds.is_empty());
    }

    #[test]
    fn geometry_file_constructor_attaches_three_stages() {
        let gl = Arc::new(MockContext::new());
        let mut vertex_file = tempfile::NamedTempFile::new().unwrap();
        let mut geometry_file = tempfile::NamedTempFile::new().unwrap();
        let mut fragment_file = tempfile::NamedTempFile::new().unwrap();
        write!(vertex_file, "{}", VERTEX).unwrap();
        write!(geometry_file, "{}", GEOMETRY).unwrap();
        write!(fragment_file, "{}", FRAGMENT).unwrap();

        let program = ShaderProgram::with_geometry(
            Arc::clone(&gl),
            vertex_file.path(),
            geometry_file.path(),
            fragment_file.path(),
        )
        .unwrap();

        let state = gl.state.borrow();
        assert_eq!(state.attachments[&program.id()].len(), 3);
    }
}
