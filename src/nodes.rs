//! Spline node specification and its resolution into breakpoint groups.

use serde::{Deserialize, Serialize};

use crate::{IsoFmError, Result};

/// How the continuum spline nodes are placed. In YAML this is an integer, a
/// list of wavelengths or a list of lists of wavelengths.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeSpec {
    /// Nodes spread evenly over the observed wavelength range, both ends
    /// included.
    UniformCount(usize),
    ExplicitBreakpoints(Vec<f64>),
    /// Independent groups, used to model discontinuous continua.
    GroupedBreakpoints(Vec<Vec<f64>>),
}

impl Default for NodeSpec {
    fn default() -> Self {
        NodeSpec::UniformCount(20)
    }
}

/// Canonical breakpoints: one strictly increasing group per continuous
/// segment.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedNodes {
    groups: Vec<Vec<f64>>,
}

impl ResolvedNodes {
    pub fn new(groups: Vec<Vec<f64>>) -> Result<Self> {
        if groups.is_empty() {
            return Err(IsoFmError::NodeSpec("no node groups".to_string()));
        }
        for (i, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(IsoFmError::NodeSpec(format!("node group {} is empty", i)));
            }
            if group.iter().any(|v| !v.is_finite()) {
                return Err(IsoFmError::NodeSpec(format!("node group {} has non-finite entries", i)));
            }
            if group.windows(2).any(|w| w[1] <= w[0]) {
                return Err(IsoFmError::NodeSpec(format!(
                    "node group {} is not strictly increasing",
                    i
                )));
            }
        }
        Ok(Self { groups })
    }

    /// Total node count, i.e. the number of continuum columns.
    pub fn count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn groups(&self) -> &[Vec<f64>] {
        &self.groups
    }

    /// All breakpoints in column order.
    pub fn breakpoints(&self) -> Vec<f64> {
        self.groups.iter().flatten().copied().collect()
    }

    /// Column index at which each group starts, followed by the total count.
    pub fn segment_bounds(&self) -> Vec<usize> {
        let mut bounds = Vec::with_capacity(self.groups.len() + 1);
        let mut start = 0;
        bounds.push(start);
        for group in &self.groups {
            start += group.len();
            bounds.push(start);
        }
        bounds
    }
}

impl NodeSpec {
    /// Resolve against the observed wavelength range `(min, max)`.
    pub fn resolve(&self, wv_range: (f64, f64)) -> Result<ResolvedNodes> {
        match self {
            NodeSpec::UniformCount(0) => Err(IsoFmError::NodeSpec("node count must be positive".to_string())),
            NodeSpec::UniformCount(n) => {
                let (lo, hi) = wv_range;
                let knots = if *n == 1 {
                    vec![lo]
                } else {
                    let step = (hi - lo) / (*n - 1) as f64;
                    (0..*n)
                        .map(|i| if i == n - 1 { hi } else { lo + step * i as f64 })
                        .collect()
                };
                ResolvedNodes::new(vec![knots])
            }
            NodeSpec::ExplicitBreakpoints(knots) => ResolvedNodes::new(vec![knots.clone()]),
            NodeSpec::GroupedBreakpoints(groups) => ResolvedNodes::new(groups.clone()),
        }
    }
}
