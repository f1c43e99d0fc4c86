//! Rotational broadening of template spectra.

use std::f64::consts::PI;

use ndarray::{Array1, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::{IsoFmError, Result};

pub trait Broadening: Sync + Send {
    /// Broaden `flux` sampled on `wvs` by a projected rotational velocity
    /// `vsini` (km/s). `epsilon` is the fixed kernel shape constant.
    fn broaden(
        &self,
        wvs: ArrayView1<f64>,
        flux: ArrayView1<f64>,
        epsilon: f64,
        vsini: f64,
    ) -> Result<Array1<f64>>;
}

/// Single-kernel rotational broadening: one rotation profile with linear limb
/// darkening `epsilon`, computed at the mean wavelength, convolved over the
/// whole uniformly sampled spectrum.
#[derive(Clone, Copy, Debug)]
pub struct FastRotBroad {
    /// km/s
    pub speed_of_light: f64,
}

impl Default for FastRotBroad {
    fn default() -> Self {
        Self {
            speed_of_light: crate::SPEED_OF_LIGHT_KMS,
        }
    }
}

impl FastRotBroad {
    /// Discrete rotation profile on a grid of step `dwl` around `ref_wvl`,
    /// normalised to unit area, zero entries dropped.
    pub fn kernel(&self, ref_wvl: f64, dwl: f64, epsilon: f64, vsini: f64) -> Array1<f64> {
        let dlmax = vsini / self.speed_of_light * ref_wvl;
        let bin_half = (((ref_wvl + dlmax) / dwl) - (ref_wvl / dwl)).floor() as i64 + 1;
        let c1 = 2.0 * (1.0 - epsilon) / (PI * dlmax * (1.0 - epsilon / 3.0));
        let c2 = epsilon / (2.0 * dlmax * (1.0 - epsilon / 3.0));
        let profile: Vec<f64> = (0..4 * bin_half)
            .map(|i| {
                let x = (i - 2 * bin_half) as f64 * dwl / dlmax;
                if x.abs() < 1.0 {
                    c1 * (1.0 - x * x).sqrt() + c2 * (1.0 - x * x)
                } else {
                    0.0
                }
            })
            .collect();
        let norm: f64 = profile.iter().sum::<f64>() * dwl;
        profile
            .into_iter()
            .map(|g| g / norm)
            .filter(|&g| g > 0.0)
            .collect()
    }
}

impl Broadening for FastRotBroad {
    fn broaden(
        &self,
        wvs: ArrayView1<f64>,
        flux: ArrayView1<f64>,
        epsilon: f64,
        vsini: f64,
    ) -> Result<Array1<f64>> {
        if wvs.len() != flux.len() {
            return Err(IsoFmError::Shape(format!(
                "broadening grid has {} samples, flux {}",
                wvs.len(),
                flux.len()
            )));
        }
        if wvs.len() < 2 {
            return Err(IsoFmError::Broadening("need at least two wavelength samples".to_string()));
        }
        if vsini.is_nan() || vsini <= 0.0 {
            return Err(IsoFmError::Broadening(format!("vsini must be positive, got {}", vsini)));
        }
        let dwl = wvs[1] - wvs[0];
        let span = wvs[wvs.len() - 1] - wvs[0];
        let uniform = wvs
            .iter()
            .zip(wvs.iter().skip(1))
            .all(|(a, b)| ((b - a) - dwl).abs() <= 1e-6 * span.abs());
        if dwl <= 0.0 || !uniform {
            return Err(IsoFmError::Broadening(
                "wavelength grid must be uniformly increasing".to_string(),
            ));
        }
        let ref_wvl = wvs.mean().unwrap_or(wvs[0]);
        let kernel = self.kernel(ref_wvl, dwl, epsilon, vsini);
        Ok(convolve_same(flux, kernel.view()) * dwl)
    }
}

/// Linear convolution, centred and cropped to the length of `signal`. Beyond
/// the edges the signal is taken as zero.
pub fn convolve_same(signal: ArrayView1<f64>, kernel: ArrayView1<f64>) -> Array1<f64> {
    let n = signal.len();
    let k = kernel.len();
    if n == 0 || k == 0 {
        return Array1::zeros(n);
    }
    let full = n + k - 1;
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(full);
    let ifft = planner.plan_fft_inverse(full);

    let pad = |a: ArrayView1<f64>| {
        let mut buf = vec![Complex::new(0.0, 0.0); full];
        for (b, &v) in buf.iter_mut().zip(a.iter()) {
            b.re = v;
        }
        buf
    };
    let mut s = pad(signal);
    let mut h = pad(kernel);
    fft.process(&mut s);
    fft.process(&mut h);
    for (a, b) in s.iter_mut().zip(h.iter()) {
        *a *= *b;
    }
    ifft.process(&mut s);

    let start = (k - 1) / 2;
    Array1::from_iter(s[start..start + n].iter().map(|c| c.re / full as f64))
}
