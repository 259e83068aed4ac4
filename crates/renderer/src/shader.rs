//! Reading shader source files from disk.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl ShaderKind {
    pub(crate) fn naga_stage(self) -> wgpu::naga::ShaderStage {
        match self {
            ShaderKind::Vertex => wgpu::naga::ShaderStage::Vertex,
            ShaderKind::Fragment => wgpu::naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderKind::Vertex => f.write_str("vertex"),
            ShaderKind::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderLoadError {
    #[error("could not open or read shader file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("memory allocation failed for shader file {path} ({bytes} bytes)")]
    Allocation { path: PathBuf, bytes: u64 },
    #[error("could not read entire shader file {path} (read {read} of {expected} bytes)")]
    Truncated {
        path: PathBuf,
        read: usize,
        expected: u64,
    },
    #[error("shader file {path} is not valid UTF-8")]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Shader text read in full from `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    path: PathBuf,
    text: String,
}

impl ShaderSource {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Reads the whole file at `path`.
///
/// The buffer is reserved up front for the file's reported length, and a
/// short read is reported instead of silently accepted.
pub fn load(path: &Path) -> Result<ShaderSource, ShaderLoadError> {
    match read_source(path) {
        Ok(source) => {
            tracing::info!(
                path = %path.display(),
                bytes = source.len(),
                "loaded shader source"
            );
            Ok(source)
        }
        Err(err) => {
            tracing::error!(path = %path.display(), "{err}");
            Err(err)
        }
    }
}

fn read_source(path: &Path) -> Result<ShaderSource, ShaderLoadError> {
    let read_error = |source| ShaderLoadError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let expected = file.metadata().map_err(read_error)?.len();

    let capacity = usize::try_from(expected).map_err(|_| ShaderLoadError::Allocation {
        path: path.to_path_buf(),
        bytes: expected,
    })?;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(capacity)
        .map_err(|_| ShaderLoadError::Allocation {
            path: path.to_path_buf(),
            bytes: expected,
        })?;

    let read = file.read_to_end(&mut bytes).map_err(read_error)?;
    if read as u64 != expected {
        return Err(ShaderLoadError::Truncated {
            path: path.to_path_buf(),
            read,
            expected,
        });
    }

    let text = String::from_utf8(bytes).map_err(|source| ShaderLoadError::Encoding {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(ShaderSource::new(path, text))
}
