use std::fs;
use std::path::Path;

use crate::error::{Result, ShaderError};

/// Reads an entire shader source file as UTF-8 text. Missing or empty
/// files are rejected; both cases are logged once here.
pub fn read_shader_source<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| {
        log::error!("Failed to read shader file {}: {}", path.display(), source);
        ShaderError::FileRead {
            path: path.to_path_buf(),
            source,
        }
    })?;

    if text.is_empty() {
        log::error!("Shader file is empty: {}", path.display());
        return Err(ShaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(text)
}
