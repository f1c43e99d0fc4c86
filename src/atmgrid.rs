//! Atmosphere model grids and template interpolation.

use ndarray::{Array1, Array2, ArrayD, ArrayView1};

use crate::{IsoFmError, Result};

/// Lookup table of synthetic spectra indexed by physical parameters
/// (temperature, gravity, ...), all sampled on one wavelength grid.
pub trait AtmosphereGrid: Sync + Send {
    /// Number of atmosphere parameters.
    fn n_params(&self) -> usize;
    /// Uniformly spaced wavelength grid of the returned spectra.
    fn wavelengths(&self) -> ArrayView1<'_, f64>;
    /// Spectrum at `params`. Points that cannot be interpolated give NaN.
    fn spectrum(&self, params: &[f64]) -> Array1<f64>;
}

/// Multilinear interpolation over a rectilinear parameter grid.
#[derive(Clone, Debug)]
pub struct RegularGrid {
    axes: Vec<Vec<f64>>,
    strides: Vec<usize>,
    /// (grid point, wavelength), grid points in row-major axis order
    values: Array2<f64>,
    wavelengths: Array1<f64>,
}

impl RegularGrid {
    /// `values` has shape `[len(axis 0), .., len(axis N-1), n_wavelengths]`.
    pub fn new(axes: Vec<Vec<f64>>, values: ArrayD<f64>, wavelengths: Array1<f64>) -> Result<Self> {
        if values.ndim() != axes.len() + 1 {
            return Err(IsoFmError::Shape(format!(
                "grid values have {} dimensions, expected {} axes + wavelength",
                values.ndim(),
                axes.len()
            )));
        }
        for (d, axis) in axes.iter().enumerate() {
            if axis.is_empty() || axis.len() != values.shape()[d] {
                return Err(IsoFmError::Shape(format!(
                    "axis {} has {} points, values have {}",
                    d,
                    axis.len(),
                    values.shape()[d]
                )));
            }
            if axis.windows(2).any(|w| w[1] <= w[0]) {
                return Err(IsoFmError::Shape(format!("axis {} is not strictly increasing", d)));
            }
        }
        let nwv = values.shape()[axes.len()];
        if nwv != wavelengths.len() {
            return Err(IsoFmError::Shape(format!(
                "grid spectra have {} samples, wavelength grid {}",
                nwv,
                wavelengths.len()
            )));
        }
        let npts: usize = axes.iter().map(Vec::len).product();
        let values = values
            .as_standard_layout()
            .into_owned()
            .into_shape((npts, nwv))
            .map_err(|e| IsoFmError::Shape(e.to_string()))?;

        let mut strides = vec![1; axes.len()];
        for d in (0..axes.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * axes[d + 1].len();
        }
        Ok(Self {
            axes,
            strides,
            values,
            wavelengths,
        })
    }

    /// lower corner index and fractional position along one axis
    fn locate(axis: &[f64], p: f64) -> Option<(usize, f64)> {
        let n = axis.len();
        if p.is_nan() || p < axis[0] || p > axis[n - 1] {
            return None;
        }
        if n == 1 {
            return Some((0, 0.0));
        }
        let i = axis.partition_point(|&a| a <= p).clamp(1, n - 1) - 1;
        Some((i, (p - axis[i]) / (axis[i + 1] - axis[i])))
    }
}

impl AtmosphereGrid for RegularGrid {
    fn n_params(&self) -> usize {
        self.axes.len()
    }

    fn wavelengths(&self) -> ArrayView1<'_, f64> {
        self.wavelengths.view()
    }

    fn spectrum(&self, params: &[f64]) -> Array1<f64> {
        let nwv = self.wavelengths.len();
        if params.len() != self.axes.len() {
            return Array1::from_elem(nwv, f64::NAN);
        }
        let mut cell = Vec::with_capacity(params.len());
        for (axis, &p) in self.axes.iter().zip(params) {
            match Self::locate(axis, p) {
                Some(loc) => cell.push(loc),
                None => return Array1::from_elem(nwv, f64::NAN),
            }
        }

        let mut out = Array1::<f64>::zeros(nwv);
        for corner in 0..(1usize << cell.len()) {
            let mut weight = 1.0;
            let mut flat = 0;
            for (d, &(i, t)) in cell.iter().enumerate() {
                let upper = (corner >> d) & 1 == 1;
                weight *= if upper { t } else { 1.0 - t };
                flat += (i + upper as usize) * self.strides[d];
            }
            if weight == 0.0 {
                continue;
            }
            out.scaled_add(weight, &self.values.row(flat));
        }
        out
    }
}

/// A single spectrum exposed as a grid without parameters.
#[derive(Clone, Debug)]
pub struct TemplateSpectrum {
    pub wavelengths: Array1<f64>,
    pub flux: Array1<f64>,
}

impl AtmosphereGrid for TemplateSpectrum {
    fn n_params(&self) -> usize {
        0
    }

    fn wavelengths(&self) -> ArrayView1<'_, f64> {
        self.wavelengths.view()
    }

    fn spectrum(&self, _params: &[f64]) -> Array1<f64> {
        self.flux.clone()
    }
}

/// Piecewise linear interpolation on increasing `xs`, returning `fill`
/// outside `[xs[0], xs[n-1]]`.
#[derive(Clone, Debug)]
pub struct Interp1d {
    xs: Vec<f64>,
    ys: Vec<f64>,
    fill: f64,
}

impl Interp1d {
    pub fn new(xs: ArrayView1<f64>, ys: ArrayView1<f64>, fill: f64) -> Result<Self> {
        if xs.len() != ys.len() || xs.is_empty() {
            return Err(IsoFmError::Shape(format!(
                "interpolation needs matching non-empty arrays, got {} and {}",
                xs.len(),
                ys.len()
            )));
        }
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            fill,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x.is_nan() {
            return f64::NAN;
        }
        if x < self.xs[0] || x > self.xs[n - 1] {
            return self.fill;
        }
        if n == 1 {
            return self.ys[0];
        }
        let i = self.xs.partition_point(|&v| v <= x).clamp(1, n - 1) - 1;
        let t = (x - self.xs[i]) / (self.xs[i + 1] - self.xs[i]);
        self.ys[i] + t * (self.ys[i + 1] - self.ys[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    /// flux = teff / 1000 + 0.1 * logg + wavelength
    fn linear_grid() -> RegularGrid {
        let teff = vec![800.0, 1000.0, 1400.0];
        let logg = vec![3.5, 4.0, 4.5, 5.0];
        let wvs = Array1::linspace(2.0, 2.1, 6);
        let values = Array3::from_shape_fn((3, 4, 6), |(i, j, k)| teff[i] / 1000.0 + 0.1 * logg[j] + wvs[k]);
        RegularGrid::new(vec![teff, logg], values.into_dyn(), wvs).unwrap()
    }

    #[test]
    fn grid_points_are_exact() {
        let grid = linear_grid();
        assert_eq!(grid.n_params(), 2);
        let spec = grid.spectrum(&[1400.0, 5.0]);
        assert_abs_diff_eq!(spec[0], 1.4 + 0.5 + 2.0, epsilon = 1e-12);
        let spec = grid.spectrum(&[800.0, 3.5]);
        assert_abs_diff_eq!(spec[5], 0.8 + 0.35 + 2.1, epsilon = 1e-12);
    }

    #[test]
    fn interpolation_is_multilinear() {
        let grid = linear_grid();
        let spec = grid.spectrum(&[1200.0, 4.2]);
        for (k, &wv) in grid.wavelengths().iter().enumerate() {
            assert_abs_diff_eq!(spec[k], 1.2 + 0.42 + wv, epsilon = 1e-12);
        }
    }

    #[test]
    fn outside_grid_is_nan() {
        let grid = linear_grid();
        assert!(grid.spectrum(&[700.0, 4.0]).iter().all(|v| v.is_nan()));
        assert!(grid.spectrum(&[900.0, f64::NAN]).iter().all(|v| v.is_nan()));
        assert!(grid.spectrum(&[900.0]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn mismatched_wavelengths_are_rejected() {
        let values = Array3::<f64>::zeros((2, 2, 5)).into_dyn();
        let res = RegularGrid::new(vec![vec![1.0, 2.0], vec![1.0, 2.0]], values, Array1::zeros(4));
        assert!(res.is_err());
    }

    #[test]
    fn template_has_no_params() {
        let t = TemplateSpectrum {
            wavelengths: Array1::linspace(1.0, 2.0, 3),
            flux: Array1::from(vec![1.0, 2.0, 3.0]),
        };
        assert_eq!(t.n_params(), 0);
        assert_eq!(t.spectrum(&[]), t.flux);
    }

    #[test]
    fn interp1d_fills_outside() {
        let xs = Array1::from(vec![1.0, 2.0, 4.0]);
        let ys = Array1::from(vec![0.0, 1.0, 5.0]);
        let f = Interp1d::new(xs.view(), ys.view(), 0.0).unwrap();
        assert_abs_diff_eq!(f.eval(1.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(f.eval(3.0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.eval(4.0), 5.0, epsilon = 1e-12);
        assert_eq!(f.eval(0.99), 0.0);
        assert_eq!(f.eval(4.01), 0.0);
        assert!(f.eval(f64::NAN).is_nan());
    }
}
