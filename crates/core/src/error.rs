use std::path::PathBuf;

use thiserror::Error;

/// Errors shared by the asset loaders, the renderer and the render worker.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Failed to decode texture {}: {message}", path.display())]
    TextureDecode { path: PathBuf, message: String },

    #[error("Invalid geometry input: {0}")]
    InvalidGeometry(String),

    /// No usable graphics context on the render thread. Fatal for the worker.
    #[error("Missing graphics context: {0}")]
    MissingGraphicsContext(String),

    #[error("GPU resource error: {0}")]
    Gpu(String),
}

impl CoreError {
    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// `true` for errors that must stop the render worker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingGraphicsContext(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
