pub mod context;
pub mod error;
pub mod program;
pub mod shader;
pub mod source;

// Re-export commonly used types
pub use context::{GlContext, RawGl};
pub use error::ShaderError;
pub use program::ShaderProgram;
pub use shader::{Shader, ShaderStage};
pub use source::read_shader_source;
