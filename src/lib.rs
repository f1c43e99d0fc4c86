//! Forward model for fitting isolated-object spectra (1D spectra, 2D
//! spectrograph data or spectral cubes) with an atmosphere model grid, a
//! transmission spectrum, rotational broadening and a spatial PSF, while the
//! continuum is left free through a spline fitted by linear least squares.

mod errors;
pub mod atmgrid;
pub mod basis;
pub mod broadening;
pub mod config;
pub mod fm;
pub mod geom;
pub mod io;
pub mod linfit;
pub mod nodes;
pub mod observation;
pub mod params;
pub mod psf;
#[cfg(feature = "python")]
mod python;

pub use crate::atmgrid::{AtmosphereGrid, RegularGrid, TemplateSpectrum};
pub use crate::config::FmConfig;
pub use crate::errors::{IsoFmError, Result};
pub use crate::fm::{FmOutput, IsoAtmGridSplineFm};
pub use crate::geom::Vec2D;
pub use crate::linfit::{fit_linear, par_fit, LinearFit};
pub use crate::nodes::NodeSpec;
pub use crate::observation::{Dimensionality, Observation};
pub use crate::params::{Location, NonLinParams};

/// Speed of light in km/s, the default of [`FmConfig::speed_of_light`].
pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python")]
#[pymodule]
fn isofm(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(python::pixgauss2d, m)?)?;
    m.add_function(wrap_pyfunction!(python::iso_atmgrid_splinefm, m)?)?;
    Ok(())
}
