//! Layout of the non-linear parameter vector.
//!
//! The optimiser works with flat vectors
//! `[atm paras.., vsini, rv, y, x]` (cubes), `[atm paras.., vsini, rv, y]`
//! (2D spectrographs, `y` being the fiber) or `[atm paras.., vsini, rv]`
//! (1D spectra). When the companion location is fixed by the
//! configuration the position entries are omitted.

use serde::{Deserialize, Serialize};

use crate::observation::Dimensionality;
use crate::{IsoFmError, Result, Vec2D};

/// Externally fixed companion location, relative to the reference position.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Location {
    /// Fiber / row coordinate of 2D data, `x = 0`.
    Fiber(f64),
    /// `[x, y]` position in a cube.
    Pixel([f64; 2]),
}

impl Location {
    pub fn offset(&self) -> Vec2D {
        match *self {
            Location::Fiber(y) => Vec2D { x: 0.0, y },
            Location::Pixel([x, y]) => Vec2D { x, y },
        }
    }
}

/// Parsed non-linear parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct NonLinParams {
    /// Atmosphere grid coordinates.
    pub atm: Vec<f64>,
    /// Projected rotational velocity in km/s.
    pub vsini: f64,
    /// Radial velocity in km/s.
    pub rv: f64,
    /// Offset from the reference position, `None` for 1D spectra or a fixed
    /// location.
    pub position: Option<Vec2D>,
}

impl NonLinParams {
    /// Split a flat parameter vector according to the grid dimensionality,
    /// the native rank of the data and whether a location is fixed.
    pub fn parse(
        paras: &[f64],
        n_atm: usize,
        dim: Dimensionality,
        loc: Option<&Location>,
    ) -> Result<Self> {
        let n_pos = if loc.is_some() { 0 } else { dim.n_position_params() };
        let expected = n_atm + 2 + n_pos;
        if paras.len() != expected {
            return Err(IsoFmError::ParamLayout(format!(
                "expected {} parameters ({} atmosphere, vsini, rv, {} position) for {:?} data, got {}",
                expected,
                n_atm,
                n_pos,
                dim,
                paras.len()
            )));
        }
        let tail = &paras[n_atm + 2..];
        let position = match tail {
            [] => None,
            [y] => Some(Vec2D { x: 0.0, y: *y }),
            [y, x] => Some(Vec2D { x: *x, y: *y }),
            _ => unreachable!("at most two position entries"),
        };
        Ok(Self {
            atm: paras[..n_atm].to_vec(),
            vsini: paras[n_atm],
            rv: paras[n_atm + 1],
            position,
        })
    }

    /// Companion offset from the reference position: the fixed location if
    /// any, else the fitted position, else zero.
    pub fn offset(&self, loc: Option<&Location>) -> Vec2D {
        match (loc, self.position) {
            (Some(loc), _) => loc.offset(),
            (None, Some(pos)) => pos,
            (None, None) => Vec2D::ZERO,
        }
    }
}
