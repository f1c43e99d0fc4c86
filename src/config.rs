use serde::{Deserialize, Serialize};

use crate::nodes::NodeSpec;
use crate::params::Location;
use crate::Result;

/// Settings of the forward model that stay fixed while the non-linear
/// parameters are explored.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct FmConfig {
    /// Width of the square stamp around the companion, must be odd.
    pub boxw: usize,
    /// Sigma of the Gaussian PSF, pixels.
    pub psfw: f64,
    pub nodes: NodeSpec,
    /// Maximum fraction of bad pixels in the stamp.
    pub badpixfraction: f64,
    /// Fixed companion location; position entries are then omitted from the
    /// parameter vector.
    pub loc: Option<Location>,
    /// Per-spaxel quadratic background columns.
    pub fit_background: bool,
    pub psf_hdfactor: usize,
    pub spline_degree: usize,
    /// Limb darkening of the rotation kernel.
    pub limb_darkening: f64,
    /// km/s
    pub speed_of_light: f64,
}

impl Default for FmConfig {
    fn default() -> Self {
        Self {
            boxw: 1,
            psfw: 1.2,
            nodes: NodeSpec::default(),
            badpixfraction: 0.75,
            loc: None,
            fit_background: false,
            psf_hdfactor: 1,
            spline_degree: 3,
            limb_darkening: 0.1,
            speed_of_light: crate::SPEED_OF_LIGHT_KMS,
        }
    }
}

impl FmConfig {
    pub fn from_yaml(filename: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(filename)?;
        let config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_yaml(&self, filename: &str) -> Result<()> {
        std::fs::write(filename, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IsoFmError;

    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fm.yaml");
        let path = path.to_str().unwrap();
        let config = FmConfig {
            boxw: 5,
            nodes: NodeSpec::GroupedBreakpoints(vec![vec![2.0, 2.1], vec![2.2, 2.3, 2.4]]),
            loc: Some(Location::Pixel([3.0, -1.5])),
            fit_background: true,
            ..Default::default()
        };
        config.to_yaml(path).unwrap();
        assert_eq!(FmConfig::from_yaml(path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: FmConfig = serde_yaml::from_str("boxw: 3\nnodes: [1.0, 1.5, 2.0]\nloc: 4.0\n").unwrap();
        assert_eq!(config.boxw, 3);
        assert_eq!(config.psfw, 1.2);
        assert_eq!(config.nodes, NodeSpec::ExplicitBreakpoints(vec![1.0, 1.5, 2.0]));
        assert_eq!(config.loc, Some(Location::Fiber(4.0)));
        assert_eq!(config.speed_of_light, crate::SPEED_OF_LIGHT_KMS);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        match FmConfig::from_yaml(path.to_str().unwrap()) {
            Err(IsoFmError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
    }
}
