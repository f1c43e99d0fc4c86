// the python side passes flat lists plus shapes, numpy style

use ndarray::{Array1, ArrayD, IxDyn};
use pyo3::prelude::*;

use crate::psf::GaussParams;
use crate::{
    FmConfig, IsoAtmGridSplineFm, IsoFmError, Location, NodeSpec, Observation, Result,
    TemplateSpectrum, Vec2D,
};

/// Spline nodes as Python passes them: a count, a list of wavelengths or a
/// list of lists of wavelengths.
#[derive(Clone, Debug, FromPyObject)]
pub enum PyNodes {
    Count(usize),
    Breakpoints(Vec<f64>),
    Groups(Vec<Vec<f64>>),
}

impl From<PyNodes> for NodeSpec {
    fn from(value: PyNodes) -> Self {
        match value {
            PyNodes::Count(n) => NodeSpec::UniformCount(n),
            PyNodes::Breakpoints(knots) => NodeSpec::ExplicitBreakpoints(knots),
            PyNodes::Groups(groups) => NodeSpec::GroupedBreakpoints(groups),
        }
    }
}

fn to_array(name: &str, values: Vec<f64>, shape: &[usize]) -> Result<ArrayD<f64>> {
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| IsoFmError::Shape(format!("{}: {}", name, e)))
}

#[pyfunction]
#[pyo3(signature = (p, shape, hdfactor=10))]
pub fn pixgauss2d(p: [f64; 5], shape: (usize, usize), hdfactor: usize) -> PyResult<Vec<Vec<f64>>> {
    let img = crate::psf::pixgauss2d(&GaussParams::from(p), shape, hdfactor)?;
    Ok(img.rows().into_iter().map(|row| row.to_vec()).collect())
}

/// Returns `(d, M, s)` with `M` as a list of rows. `nodes` defaults to 20.
#[allow(clippy::too_many_arguments)]
#[pyfunction]
#[pyo3(signature = (
    nonlin_paras, data, data_shape, wavelengths, wavelengths_shape, template_wvs,
    template_flux, transmission, noise=None, bad_pixels=None, bary_rv=0.0,
    refpos=(0.0, 0.0), boxw=1, psfw=1.2, nodes=None, badpixfraction=0.75, loc=None
))]
pub fn iso_atmgrid_splinefm(
    nonlin_paras: Vec<f64>,
    data: Vec<f64>,
    data_shape: Vec<usize>,
    wavelengths: Vec<f64>,
    wavelengths_shape: Vec<usize>,
    template_wvs: Vec<f64>,
    template_flux: Vec<f64>,
    transmission: Vec<f64>,
    noise: Option<Vec<f64>>,
    bad_pixels: Option<Vec<f64>>,
    bary_rv: f64,
    refpos: (f64, f64),
    boxw: usize,
    psfw: f64,
    nodes: Option<PyNodes>,
    badpixfraction: f64,
    loc: Option<Vec<f64>>,
) -> PyResult<(Vec<f64>, Vec<Vec<f64>>, Vec<f64>)> {
    let noise = noise.map(|n| to_array("noise", n, &data_shape)).transpose()?;
    let bad_pixels = bad_pixels
        .map(|b| to_array("bad_pixels", b, &data_shape))
        .transpose()?;
    let obs = Observation::new(
        to_array("wavelengths", wavelengths, &wavelengths_shape)?,
        to_array("data", data, &data_shape)?,
        noise,
        bad_pixels,
        bary_rv,
    )?
    .with_refpos(Vec2D::new(refpos.0, refpos.1));

    let loc = match loc.as_deref() {
        None => None,
        Some([y]) => Some(Location::Fiber(*y)),
        Some([x, y]) => Some(Location::Pixel([*x, *y])),
        Some(other) => {
            return Err(IsoFmError::ParamLayout(format!(
                "loc must have one or two entries, got {}",
                other.len()
            ))
            .into())
        }
    };
    let config = FmConfig {
        boxw,
        psfw,
        nodes: nodes.map(NodeSpec::from).unwrap_or_default(),
        badpixfraction,
        loc,
        ..Default::default()
    };
    let grid = TemplateSpectrum {
        wavelengths: Array1::from(template_wvs),
        flux: Array1::from(template_flux),
    };
    let transmission = Array1::from(transmission);
    let fm = IsoAtmGridSplineFm::new(&grid, transmission.view(), config);
    let out = fm.build(&nonlin_paras, &obs)?;
    Ok((
        out.d.to_vec(),
        out.m.rows().into_iter().map(|row| row.to_vec()).collect(),
        out.s.to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_nodes_map_to_node_specs() {
        assert_eq!(NodeSpec::from(PyNodes::Count(7)), NodeSpec::UniformCount(7));
        assert_eq!(
            NodeSpec::from(PyNodes::Breakpoints(vec![2.0, 2.1, 2.3])),
            NodeSpec::ExplicitBreakpoints(vec![2.0, 2.1, 2.3])
        );
        let groups = NodeSpec::from(PyNodes::Groups(vec![vec![2.0, 2.1], vec![2.2, 2.3, 2.4]]));
        assert_eq!(groups.resolve((2.0, 2.4)).unwrap().count(), 5);
        let absent: Option<PyNodes> = None;
        assert_eq!(absent.map(NodeSpec::from).unwrap_or_default(), NodeSpec::UniformCount(20));
    }
}
