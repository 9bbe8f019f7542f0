use thiserror::Error;

#[derive(Error, Debug)]
pub enum StitchError {
    #[error("Invalid inference configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported raster channel count: {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(usize),

    #[error("Model output shape {actual:?} cannot be read as {expected} probability maps of {tile}x{tile}")]
    ModelOutputShape {
        expected: usize,
        tile: usize,
        actual: Vec<usize>,
    },

    #[error("Model invocation failed: {0}")]
    Model(String),

    #[error("Model failed to load: {0}")]
    ModelLoad(String),

    #[error("Model backend not available in this build: {0}")]
    BackendUnavailable(String),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, StitchError>;
