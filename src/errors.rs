#[cfg(feature = "python")]
use pyo3::{exceptions::PyValueError, PyErr};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IsoFmError>;

#[derive(Debug, Error)]
pub enum IsoFmError {
    #[error("invalid stamp width: {0}")]
    StampWidth(String),
    #[error("invalid node specification: {0}")]
    NodeSpec(String),
    #[error("invalid non-linear parameter layout: {0}")]
    ParamLayout(String),
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("rotational broadening failed: {0}")]
    Broadening(String),
    #[error("{0}")]
    Linalg(String),
    #[error("{0}")]
    InvalidFITS(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(feature = "python")]
impl From<IsoFmError> for PyErr {
    fn from(value: IsoFmError) -> Self {
        PyValueError::new_err(value.to_string())
    }
}
