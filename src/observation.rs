//! Instrument data normalised to `(wavelength, row, column)` cubes.

use ndarray::{s, Array3, ArrayD, ArrayView1, Axis, Ix1, Ix2, Ix3};

use crate::{IsoFmError, Result, Vec2D};

/// Native rank of the data before normalisation. Only used to decide how many
/// trailing position entries the non-linear parameter vector carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimensionality {
    /// 1D spectrum, no spatial information.
    Spectrum,
    /// 2D spectrograph data, one spatial (fiber / row) axis.
    Spectrograph,
    /// 3D spectral cube.
    Cube,
}

impl Dimensionality {
    fn from_ndim(ndim: usize) -> Result<Self> {
        match ndim {
            1 => Ok(Dimensionality::Spectrum),
            2 => Ok(Dimensionality::Spectrograph),
            3 => Ok(Dimensionality::Cube),
            n => Err(IsoFmError::Shape(format!("data must have 1 to 3 dimensions, got {}", n))),
        }
    }

    /// Number of position entries trailing `[.., vsini, rv]`.
    pub fn n_position_params(&self) -> usize {
        match self {
            Dimensionality::Spectrum => 0,
            Dimensionality::Spectrograph => 1,
            Dimensionality::Cube => 2,
        }
    }
}

/// Observation with every array embedded in 3D.
///
/// `bad_pixels` follows the usual convention: NaN marks a bad pixel, any
/// finite value a good one.
#[derive(Clone, Debug)]
pub struct Observation {
    /// `(nz, 1 | ny, 1 | nx)`, global, per-row or per-pixel sampling.
    pub wavelengths: Array3<f64>,
    pub data: Array3<f64>,
    pub noise: Array3<f64>,
    pub bad_pixels: Array3<f64>,
    /// Barycentric radial velocity in km/s.
    pub bary_rv: f64,
    /// Pixel coordinates of the optical axis / fiber zero.
    pub refpos: Vec2D,
    pub dim: Dimensionality,
}

fn to_cube(name: &str, a: ArrayD<f64>) -> Result<Array3<f64>> {
    let err = |e: ndarray::ShapeError| IsoFmError::Shape(format!("{}: {}", name, e));
    match a.ndim() {
        1 => Ok(a
            .into_dimensionality::<Ix1>()
            .map_err(err)?
            .insert_axis(Axis(1))
            .insert_axis(Axis(2))),
        2 => Ok(a.into_dimensionality::<Ix2>().map_err(err)?.insert_axis(Axis(2))),
        3 => a.into_dimensionality::<Ix3>().map_err(err),
        n => Err(IsoFmError::Shape(format!("{} must have 1 to 3 dimensions, got {}", name, n))),
    }
}

impl Observation {
    /// Build an observation from arrays of native rank. Missing noise
    /// defaults to ones, a missing bad pixel map to all good.
    pub fn new(
        wavelengths: ArrayD<f64>,
        data: ArrayD<f64>,
        noise: Option<ArrayD<f64>>,
        bad_pixels: Option<ArrayD<f64>>,
        bary_rv: f64,
    ) -> Result<Self> {
        let dim = Dimensionality::from_ndim(data.ndim())?;
        if let Some(noise) = &noise {
            if noise.shape() != data.shape() {
                return Err(IsoFmError::Shape(format!(
                    "noise {:?} must match data {:?}",
                    noise.shape(),
                    data.shape()
                )));
            }
        }
        if let Some(bad_pixels) = &bad_pixels {
            if bad_pixels.shape() != data.shape() {
                return Err(IsoFmError::Shape(format!(
                    "bad pixels {:?} must match data {:?}",
                    bad_pixels.shape(),
                    data.shape()
                )));
            }
        }

        let data = to_cube("data", data)?;
        let wavelengths = to_cube("wavelengths", wavelengths)?;
        let (nz, ny, nx) = data.dim();
        let (nzw, nyw, nxw) = wavelengths.dim();
        if nzw != nz || (nyw != 1 && nyw != ny) || (nxw != 1 && nxw != nx) {
            return Err(IsoFmError::Shape(format!(
                "wavelengths {:?} incompatible with data {:?}",
                wavelengths.dim(),
                data.dim()
            )));
        }

        let noise = match noise {
            Some(noise) => to_cube("noise", noise)?,
            None => {
                log::warn!("no noise array given, using unit noise");
                Array3::ones(data.dim())
            }
        };
        let bad_pixels = match bad_pixels {
            Some(bad_pixels) => to_cube("bad_pixels", bad_pixels)?,
            None => Array3::ones(data.dim()),
        };

        Ok(Self {
            wavelengths,
            data,
            noise,
            bad_pixels,
            bary_rv,
            refpos: Vec2D::ZERO,
            dim,
        })
    }

    pub fn with_refpos(mut self, refpos: Vec2D) -> Self {
        self.refpos = refpos;
        self
    }

    /// `(nz, ny, nx)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Smallest and largest finite wavelength over the whole array.
    pub fn wavelength_range(&self) -> Option<(f64, f64)> {
        self.wavelengths
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Wavelength samples of spaxel `(row, col)`, clipped to the spatial
    /// extent of the wavelength array.
    pub fn spaxel_wavelengths(&self, row: i64, col: i64) -> ArrayView1<'_, f64> {
        let (_, nyw, nxw) = self.wavelengths.dim();
        let row = row.clamp(0, nyw as i64 - 1) as usize;
        let col = col.clamp(0, nxw as i64 - 1) as usize;
        self.wavelengths.slice(s![.., row, col])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array2};

    #[test]
    fn spectrum_is_embedded_in_3d() {
        let wvs = Array1::linspace(1.0, 2.0, 11).into_dyn();
        let data = Array1::from_elem(11, 3.0).into_dyn();
        let obs = Observation::new(wvs, data, None, None, 0.0).unwrap();
        assert_eq!(obs.dim, Dimensionality::Spectrum);
        assert_eq!(obs.shape(), (11, 1, 1));
        assert_eq!(obs.wavelengths.dim(), (11, 1, 1));
        assert_eq!(obs.noise[[4, 0, 0]], 1.0);
        assert_eq!(obs.wavelength_range(), Some((1.0, 2.0)));
    }

    #[test]
    fn spectrograph_keeps_per_row_wavelengths() {
        let wvs = Array2::from_shape_fn((5, 3), |(z, y)| 1.0 + z as f64 * 0.1 + y as f64 * 0.01);
        let data = Array2::<f64>::zeros((5, 3));
        let obs = Observation::new(wvs.into_dyn(), data.into_dyn(), None, None, 1.5).unwrap();
        assert_eq!(obs.dim, Dimensionality::Spectrograph);
        assert_eq!(obs.dim.n_position_params(), 1);
        assert_eq!(obs.shape(), (5, 3, 1));
        assert_relative_eq!(obs.spaxel_wavelengths(2, 0)[1], 1.12, epsilon = 1e-12);
        // clipped to the last row
        assert_relative_eq!(obs.spaxel_wavelengths(7, 4)[0], 1.02, epsilon = 1e-12);
        assert_relative_eq!(obs.spaxel_wavelengths(-3, 0)[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_noise_is_rejected() {
        let wvs = Array1::linspace(1.0, 2.0, 4).into_dyn();
        let data = Array3::<f64>::zeros((4, 2, 2)).into_dyn();
        let noise = Array3::<f64>::ones((4, 2, 3)).into_dyn();
        let res = Observation::new(wvs, data, Some(noise), None, 0.0);
        assert!(matches!(res, Err(IsoFmError::Shape(_))));
    }

    #[test]
    fn mismatched_wavelengths_are_rejected() {
        let wvs = Array1::linspace(1.0, 2.0, 5).into_dyn();
        let data = Array3::<f64>::zeros((4, 2, 2)).into_dyn();
        assert!(Observation::new(wvs, data, None, None, 0.0).is_err());
    }
}
