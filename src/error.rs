use std::ffi::NulError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("Shader compilation failed: {0}")]
    Compilation(String),

    #[error("Program linking failed: {0}")]
    Linking(String),

    #[error("Failed to read shader file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Shader file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("Null byte in shader source: {0}")]
    Nul(#[from] NulError),

    #[error("Driver failed to allocate an object handle")]
    ObjectCreation,
}

pub type Result<T> = std::result::Result<T, ShaderError>;
