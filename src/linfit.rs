use ndarray::{Array1, Array2, Axis};
use ndarray_inverse::Inverse;
use rayon::prelude::*;

use crate::atmgrid::AtmosphereGrid;
use crate::basis::SplineBasis;
use crate::broadening::Broadening;
use crate::fm::{FmOutput, IsoAtmGridSplineFm};
use crate::observation::Observation;
use crate::{IsoFmError, Result};

/// Weighted least-squares solution of `d ~ M p`.
#[derive(Clone, Debug)]
pub struct LinearFit {
    /// One entry per model column; columns that are identically zero get 0.
    pub coeffs: Array1<f64>,
    /// `M p`
    pub model: Array1<f64>,
    /// `d - M p`
    pub residuals: Array1<f64>,
    pub chi2: f64,
    pub n_data: usize,
    /// Number of columns actually fitted.
    pub n_free: usize,
}

impl LinearFit {
    /// `chi2 / (n_data - n_free)`, NaN without degrees of freedom.
    pub fn reduced_chi2(&self) -> f64 {
        if self.n_data > self.n_free {
            self.chi2 / (self.n_data - self.n_free) as f64
        } else {
            f64::NAN
        }
    }
}

/// Solve the noise-weighted normal equations of an assembled model. Returns
/// `None` for an empty model.
pub fn fit_linear(out: &FmOutput) -> Result<Option<LinearFit>> {
    if out.is_empty() {
        return Ok(None);
    }
    let n_data = out.d.len();
    let valid: Vec<usize> = out
        .m
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, col)| col.iter().map(|v| v.abs()).sum::<f64>() > 0.0)
        .map(|(j, _)| j)
        .collect();
    if valid.is_empty() {
        return Ok(None);
    }

    let mw = Array2::from_shape_fn((n_data, valid.len()), |(i, c)| out.m[[i, valid[c]]] / out.s[i]);
    let dw = &out.d / &out.s;

    // 1. Compute Mw.T @ Mw
    let gram = mw.t().dot(&mw);
    // 2. Invert it
    let gram_inv = match gram.inv() {
        Some(inv) => inv,
        None => {
            return Err(IsoFmError::Linalg(
                "normal equations of the linear model are not invertible".to_string(),
            ))
        }
    };
    // 3. p = inv(Mw.T @ Mw) @ Mw.T @ dw
    let p = gram_inv.dot(&mw.t().dot(&dw));

    let mut coeffs = Array1::<f64>::zeros(out.m.ncols());
    for (c, &j) in valid.iter().enumerate() {
        coeffs[j] = p[c];
    }
    let model = out.m.dot(&coeffs);
    let residuals = &out.d - &model;
    let chi2: f64 = residuals
        .iter()
        .zip(out.s.iter())
        .map(|(r, s)| (r / s).powi(2))
        .sum();

    Ok(Some(LinearFit {
        coeffs,
        model,
        residuals,
        chi2,
        n_data,
        n_free: valid.len(),
    }))
}

/// Build and solve the model for every parameter vector, in parallel. Results
/// come back in input order.
pub fn par_fit<G, S, B>(
    fm: &IsoAtmGridSplineFm<'_, G, S, B>,
    obs: &Observation,
    paras: &[Vec<f64>],
) -> Vec<Result<Option<LinearFit>>>
where
    G: AtmosphereGrid + ?Sized,
    S: SplineBasis,
    B: Broadening,
{
    paras
        .par_iter()
        .map(|p| fit_linear(&fm.build(p, obs)?))
        .collect()
}
