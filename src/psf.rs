//! Pixel-integrated 2D Gaussian used as the spatial PSF of the companion.

use std::f64::consts::PI;

use ndarray::Array2;

use crate::{IsoFmError, Result, Vec2D};

/// Parameters of [`pixgauss2d`]: amplitude, centre in pixels, sigma and a
/// constant background added after integration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussParams {
    pub amplitude: f64,
    pub center: Vec2D,
    pub width: f64,
    pub background: f64,
}

impl From<[f64; 5]> for GaussParams {
    /// `[amplitude, x, y, width, background]`
    fn from(p: [f64; 5]) -> Self {
        Self {
            amplitude: p[0],
            center: Vec2D { x: p[1], y: p[2] },
            width: p[3],
            background: p[4],
        }
    }
}

/// Coordinate grids `hdfactor` times finer than `shape` (rows, cols).
/// Sub-samples of pixel `i` sit at `i, i + 1/hdfactor, ...`.
pub fn hd_grids(shape: (usize, usize), hdfactor: usize) -> (Array2<f64>, Array2<f64>) {
    let (ny, nx) = shape;
    let dim = (hdfactor * ny, hdfactor * nx);
    let f = hdfactor as f64;
    let xhd = Array2::from_shape_fn(dim, |(_, j)| j as f64 / f);
    let yhd = Array2::from_shape_fn(dim, |(i, _)| i as f64 / f);
    (xhd, yhd)
}

/// Gaussian evaluated on a grid `hdfactor` times finer than `shape`, averaged
/// back down to one value per pixel, plus background.
pub fn pixgauss2d(p: &GaussParams, shape: (usize, usize), hdfactor: usize) -> Result<Array2<f64>> {
    if hdfactor == 0 {
        return Err(IsoFmError::Shape("psf super-sampling factor must be >= 1".to_string()));
    }
    let (xhd, yhd) = hd_grids(shape, hdfactor);
    pixgauss2d_on_grid(p, shape, &xhd, &yhd)
}

/// Same as [`pixgauss2d`] with precomputed high resolution grids. The
/// super-sampling factor is inferred from the grid size relative to `shape`.
pub fn pixgauss2d_on_grid(
    p: &GaussParams,
    shape: (usize, usize),
    xhdgrid: &Array2<f64>,
    yhdgrid: &Array2<f64>,
) -> Result<Array2<f64>> {
    let (ny, nx) = shape;
    if ny == 0 || nx == 0 {
        return Err(IsoFmError::Shape(format!("empty psf shape {:?}", shape)));
    }
    if xhdgrid.dim() != yhdgrid.dim() {
        return Err(IsoFmError::Shape(format!(
            "psf grids differ: {:?} vs {:?}",
            xhdgrid.dim(),
            yhdgrid.dim()
        )));
    }
    let hdfactor = xhdgrid.nrows() / ny;
    if hdfactor == 0 || xhdgrid.dim() != (hdfactor * ny, hdfactor * nx) {
        return Err(IsoFmError::Shape(format!(
            "psf grid {:?} is not an integer super-sampling of {:?}",
            xhdgrid.dim(),
            shape
        )));
    }

    let w2 = p.width * p.width;
    let norm = p.amplitude / (2.0 * PI * w2);
    let mut out = Array2::<f64>::zeros(shape);
    for ((i, j), v) in out.indexed_iter_mut() {
        // nan-ignoring block mean
        let mut sum = 0.0;
        let mut count = 0usize;
        for a in 0..hdfactor {
            for b in 0..hdfactor {
                let idx = [i * hdfactor + a, j * hdfactor + b];
                let dx = p.center.x - xhdgrid[idx];
                let dy = p.center.y - yhdgrid[idx];
                let val = norm * (-0.5 * (dx * dx + dy * dy) / w2).exp();
                if !val.is_nan() {
                    sum += val;
                    count += 1;
                }
            }
        }
        let mean = if count > 0 { sum / count as f64 } else { f64::NAN };
        *v = mean + p.background;
    }
    Ok(out)
}

/// Unit-amplitude PSF over a `boxw` x `boxw` stamp, normalised to sum to one.
pub fn stamp_psf(boxw: usize, center: Vec2D, psfw: f64, hdfactor: usize) -> Result<Array2<f64>> {
    let p = GaussParams {
        amplitude: 1.0,
        center,
        width: psfw,
        background: 0.0,
    };
    let mut psf = pixgauss2d(&p, (boxw, boxw), hdfactor)?;
    let total: f64 = psf.iter().filter(|v| !v.is_nan()).sum();
    psf /= total;
    Ok(psf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stamp_psf_sums_to_one() {
        for &(dx, dy) in &[(0.0, 0.0), (0.3, -0.4), (-0.5, 0.5), (0.49, 0.12)] {
            for &boxw in &[3usize, 5, 7] {
                let w = ((boxw - 1) / 2) as f64;
                let psf = stamp_psf(boxw, Vec2D::new(w + dx, w + dy), 1.2, 1).unwrap();
                assert_relative_eq!(psf.sum(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn single_pixel_stamp_is_unity() {
        let psf = stamp_psf(1, Vec2D::new(0.2, -0.3), 1.2, 1).unwrap();
        assert_eq!(psf.dim(), (1, 1));
        assert_relative_eq!(psf[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn supersampled_integral_matches_amplitude() {
        let p = GaussParams::from([3.0, 10.0, 9.0, 1.0, 0.0]);
        let img = pixgauss2d(&p, (21, 21), 10).unwrap();
        assert_relative_eq!(img.sum(), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn background_is_added_everywhere() {
        let p0 = GaussParams::from([1.0, 2.0, 2.0, 0.8, 0.0]);
        let p1 = GaussParams::from([1.0, 2.0, 2.0, 0.8, 0.25]);
        let a = pixgauss2d(&p0, (5, 5), 3).unwrap();
        let b = pixgauss2d(&p1, (5, 5), 3).unwrap();
        for (va, vb) in a.iter().zip(b.iter()) {
            assert_relative_eq!(vb - va, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn peak_follows_center() {
        let p = GaussParams::from([1.0, 3.0, 1.0, 0.7, 0.0]);
        let img = pixgauss2d(&p, (4, 6), 1).unwrap();
        let (argmax, _) = img
            .indexed_iter()
            .fold(((0, 0), f64::MIN), |acc, (idx, &v)| if v > acc.1 { (idx, v) } else { acc });
        assert_eq!(argmax, (1, 3));
    }

    #[test]
    fn grid_factor_is_inferred() {
        let p = GaussParams::from([1.0, 1.3, 0.6, 0.9, 0.0]);
        let (xhd, yhd) = hd_grids((3, 4), 5);
        let a = pixgauss2d_on_grid(&p, (3, 4), &xhd, &yhd).unwrap();
        let b = pixgauss2d(&p, (3, 4), 5).unwrap();
        for (va, vb) in a.iter().zip(b.iter()) {
            assert_relative_eq!(*va, *vb, epsilon = 1e-14);
        }
    }

    #[test]
    fn inconsistent_grid_is_rejected() {
        let p = GaussParams::from([1.0, 1.0, 1.0, 1.0, 0.0]);
        let (xhd, yhd) = hd_grids((3, 5), 2);
        assert!(pixgauss2d_on_grid(&p, (3, 4), &xhd, &yhd).is_err());
        assert!(pixgauss2d(&p, (3, 4), 0).is_err());
    }
}
