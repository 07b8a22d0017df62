//! Error types for scene generation

use thiserror::Error;

/// Failures raised by the library modules.
///
/// Advisory problems (out-of-range cutoffs, false silos, unsupported image
/// extensions) are logged and corrected instead of being reported here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("field array must have 5 dimensions [z, y, x, field, component], got {0}")]
    FieldRank(usize),

    #[error("simulation index {index} out of range for a stack of {count}")]
    SimulationIndex { index: usize, count: usize },

    #[error("device `{0}` not found in store")]
    DeviceNotFound(String),

    #[error("malformed device record: {0}")]
    Device(String),

    #[error("slice region on axis {axis} must lie within [0, 1], got [{min}, {max}]")]
    SliceRegion { axis: usize, min: f64, max: f64 },

    #[error("unknown field quantity `{0}`")]
    Quantity(String),

    #[error("unsupported colormap `{0}`")]
    Colormap(String),

    #[error("no isosurface cutoffs given")]
    NoCutoffs,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read .npy array: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
