//! Forward model of an isolated companion (no speckles).
//!
//! The companion spectrum is an atmosphere grid template, spin broadened,
//! Doppler shifted and multiplied by the transmission, spread over a small
//! stamp by a Gaussian PSF. Its continuum is left free through a spline
//! whose node amplitudes are the linear parameters of the model. The linear
//! model has `N_nodes` columns, plus `3 * boxw^2` when the per-spaxel
//! background is fitted.

use ndarray::{Array1, Array2, ArrayView1};

use crate::atmgrid::{AtmosphereGrid, Interp1d};
use crate::basis::{CardinalSpline, SplineBasis};
use crate::broadening::{Broadening, FastRotBroad};
use crate::config::FmConfig;
use crate::nodes::ResolvedNodes;
use crate::observation::Observation;
use crate::params::NonLinParams;
use crate::psf::stamp_psf;
use crate::{IsoFmError, Result, Vec2D};

/// Data, linear model and noise with bad pixels removed.
#[derive(Clone, Debug)]
pub struct FmOutput {
    /// Observed values, `(Nd,)`.
    pub d: Array1<f64>,
    /// Linear model, `(Nd, Np)`.
    pub m: Array2<f64>,
    /// Noise (standard deviation), `(Nd,)`.
    pub s: Array1<f64>,
}

impl FmOutput {
    /// No usable pixels, but the column count of a real fit.
    pub fn empty(n_linpara: usize) -> Self {
        Self {
            d: Array1::zeros(0),
            m: Array2::zeros((0, n_linpara)),
            s: Array1::zeros(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.d.is_empty()
    }

    pub fn n_linpara(&self) -> usize {
        self.m.ncols()
    }
}

/// Spline continuum forward model over an atmosphere grid.
pub struct IsoAtmGridSplineFm<'a, G: ?Sized, S = CardinalSpline, B = FastRotBroad> {
    pub atm_grid: &'a G,
    /// Tellurics and instrument, one value per wavelength channel. NaN
    /// channels are excluded from the fit.
    pub transmission: ArrayView1<'a, f64>,
    pub config: FmConfig,
    pub spline: S,
    pub broadening: B,
}

impl<'a, G: AtmosphereGrid + ?Sized> IsoAtmGridSplineFm<'a, G> {
    pub fn new(atm_grid: &'a G, transmission: ArrayView1<'a, f64>, config: FmConfig) -> Self {
        let broadening = FastRotBroad {
            speed_of_light: config.speed_of_light,
        };
        Self {
            atm_grid,
            transmission,
            config,
            spline: CardinalSpline,
            broadening,
        }
    }
}

impl<'a, G, S, B> IsoAtmGridSplineFm<'a, G, S, B>
where
    G: AtmosphereGrid + ?Sized,
    S: SplineBasis,
    B: Broadening,
{
    /// Number of linear parameters for a given node resolution.
    pub fn n_linpara(&self, nodes: &ResolvedNodes) -> usize {
        let background = if self.config.fit_background {
            3 * self.config.boxw * self.config.boxw
        } else {
            0
        };
        nodes.count() + background
    }

    pub fn parse_params(&self, nonlin_paras: &[f64], obs: &Observation) -> Result<NonLinParams> {
        NonLinParams::parse(
            nonlin_paras,
            self.atm_grid.n_params(),
            obs.dim,
            self.config.loc.as_ref(),
        )
    }

    /// Build `(d, M, s)` from a flat non-linear parameter vector.
    pub fn build(&self, nonlin_paras: &[f64], obs: &Observation) -> Result<FmOutput> {
        let params = self.parse_params(nonlin_paras, obs)?;
        self.build_from(&params, obs)
    }

    /// Build `(d, M, s)`. Configuration mistakes are errors; stamps with too
    /// many bad pixels, negative `vsini` or an unusable template give
    /// [`FmOutput::empty`].
    pub fn build_from(&self, p: &NonLinParams, obs: &Observation) -> Result<FmOutput> {
        let cfg = &self.config;
        let boxw = cfg.boxw;
        let (nz, ny, nx) = obs.shape();

        if boxw % 2 == 0 {
            return Err(IsoFmError::StampWidth(format!(
                "boxw, the width of the stamp around the companion, must be odd, got {}",
                boxw
            )));
        }
        if boxw > ny || boxw > nx {
            return Err(IsoFmError::StampWidth(format!(
                "boxw {} cannot be bigger than the data ({} x {})",
                boxw, ny, nx
            )));
        }
        if self.transmission.len() != nz {
            return Err(IsoFmError::Shape(format!(
                "transmission has {} channels, data {}",
                self.transmission.len(),
                nz
            )));
        }
        if p.atm.len() != self.atm_grid.n_params() {
            return Err(IsoFmError::ParamLayout(format!(
                "{} atmosphere parameters for a {} dimensional grid",
                p.atm.len(),
                self.atm_grid.n_params()
            )));
        }

        let wv_range = obs
            .wavelength_range()
            .ok_or_else(|| IsoFmError::Shape("no finite wavelength in observation".to_string()))?;
        let nodes = cfg.nodes.resolve(wv_range)?;
        let n_nodes = nodes.count();
        let n_linpara = self.n_linpara(&nodes);

        // stamp centre, rounded, with the sub-pixel remainder kept for the psf
        let w = (boxw - 1) / 2;
        let target = obs.refpos + p.offset(cfg.loc.as_ref());
        if !target.x.is_finite() || !target.y.is_finite() || !p.rv.is_finite() {
            log::debug!("rejecting position {:?}, rv = {}", target, p.rv);
            return Ok(FmOutput::empty(n_linpara));
        }
        // no stamp pixel can overlap the data beyond one stamp width
        let reach = boxw as f64;
        if target.x < -reach
            || target.x > nx as f64 + reach
            || target.y < -reach
            || target.y > ny as f64 + reach
        {
            log::debug!("stamp centre {:?} is off the {} x {} data", target, ny, nx);
            return Ok(FmOutput::empty(n_linpara));
        }
        let (l, k) = target.round_pixel();
        let sub = Vec2D {
            x: target.x - l as f64,
            y: target.y - k as f64,
        };
        let row0 = k - w as i64;
        let col0 = l - w as i64;
        log::trace!(
            "stamp centre (row {}, col {}), sub-pixel offset ({:.3}, {:.3})",
            k,
            l,
            sub.x,
            sub.y
        );

        // extract the stamp, NaN beyond the edges, ordered (z, row, col)
        let n_pix = nz * boxw * boxw;
        let mut d = Vec::with_capacity(n_pix);
        let mut s = Vec::with_capacity(n_pix);
        let mut good = Vec::with_capacity(n_pix);
        for z in 0..nz {
            let bad_channel = self.transmission[z].is_nan();
            for a in 0..boxw {
                for b in 0..boxw {
                    let row = row0 + a as i64;
                    let col = col0 + b as i64;
                    let inside = row >= 0 && (row as usize) < ny && col >= 0 && (col as usize) < nx;
                    let (dv, sv, bv) = if inside {
                        let idx = [z, row as usize, col as usize];
                        (obs.data[idx], obs.noise[idx], obs.bad_pixels[idx])
                    } else {
                        (f64::NAN, f64::NAN, f64::NAN)
                    };
                    // zero noise is treated as a bad pixel
                    good.push(
                        !bad_channel && bv.is_finite() && sv != 0.0 && sv.is_finite() && dv.is_finite(),
                    );
                    d.push(dv);
                    s.push(sv);
                }
            }
        }

        let n_good = good.iter().filter(|&&g| g).count();
        if n_good as f64 <= (1.0 - cfg.badpixfraction) * n_pix as f64 {
            log::debug!("too many bad pixels: {} good out of {}", n_good, n_pix);
            return Ok(FmOutput::empty(n_linpara));
        }
        if p.vsini.is_nan() || p.vsini < 0.0 {
            log::debug!("rejecting vsini = {}", p.vsini);
            return Ok(FmOutput::empty(n_linpara));
        }

        let grid_wvs = self.atm_grid.wavelengths();
        let planet_model = self.atm_grid.spectrum(&p.atm);
        if planet_model.len() != grid_wvs.len()
            || planet_model.iter().any(|v| !v.is_finite())
            || planet_model.iter().all(|&v| v == 0.0)
        {
            log::debug!("unusable atmosphere grid spectrum at {:?}", p.atm);
            return Ok(FmOutput::empty(n_linpara));
        }
        let template = if p.vsini != 0.0 {
            self.broadening
                .broaden(grid_wvs, planet_model.view(), cfg.limb_darkening, p.vsini)?
        } else {
            planet_model
        };
        let planet_f = Interp1d::new(grid_wvs, template.view(), 0.0)?;

        // continuum basis on the wavelengths of the stamp centre
        let m_spline = self.spline.design_matrix(
            &nodes,
            obs.spaxel_wavelengths(k, l),
            cfg.spline_degree,
        )?;
        if m_spline.dim() != (nz, n_nodes) {
            return Err(IsoFmError::Shape(format!(
                "spline basis is {:?}, expected {:?}",
                m_spline.dim(),
                (nz, n_nodes)
            )));
        }

        let center = Vec2D {
            x: w as f64 + sub.x,
            y: w as f64 + sub.y,
        };
        let psf = stamp_psf(boxw, center, cfg.psfw, cfg.psf_hdfactor)?;

        // companion spectrum seen by each spaxel, row-major over the stamp
        let doppler = 1.0 - (p.rv - obs.bary_rv) / cfg.speed_of_light;
        let spaxel_wvs: Vec<ArrayView1<f64>> = (0..boxw * boxw)
            .map(|sp| obs.spaxel_wavelengths(row0 + (sp / boxw) as i64, col0 + (sp % boxw) as i64))
            .collect();
        let planet_specs: Vec<Array1<f64>> = spaxel_wvs
            .iter()
            .map(|lwvs| {
                Array1::from_shape_fn(nz, |z| self.transmission[z] * planet_f.eval(lwvs[z] * doppler))
            })
            .collect();

        let mut m = Array2::<f64>::zeros((n_good, n_linpara));
        let mut d_out = Vec::with_capacity(n_good);
        let mut s_out = Vec::with_capacity(n_good);
        let mut r = 0;
        for (idx, _) in good.iter().enumerate().filter(|(_, g)| **g) {
            let z = idx / (boxw * boxw);
            let sp = idx % (boxw * boxw);
            let scale = psf[[sp / boxw, sp % boxw]] * planet_specs[sp][z];
            for j in 0..n_nodes {
                m[[r, j]] = scale * m_spline[[z, j]];
            }
            if cfg.fit_background {
                let lw = spaxel_wvs[sp][z];
                let c = n_nodes + 3 * sp;
                m[[r, c]] = 1.0;
                m[[r, c + 1]] = lw;
                m[[r, c + 2]] = lw * lw;
            }
            d_out.push(d[idx]);
            s_out.push(s[idx]);
            r += 1;
        }

        Ok(FmOutput {
            d: Array1::from(d_out),
            m,
            s: Array1::from(s_out),
        })
    }
}
