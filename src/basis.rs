use ndarray::{Array2, ArrayView1};
use ndarray_inverse::Inverse;

use crate::nodes::ResolvedNodes;
use crate::{IsoFmError, Result};

/// Builds the linear model of the continuum: one column per spline node, one
/// row per wavelength sample.
pub trait SplineBasis: Sync + Send {
    fn design_matrix(
        &self,
        nodes: &ResolvedNodes,
        x: ArrayView1<f64>,
        degree: usize,
    ) -> Result<Array2<f64>>;
}

/// Interpolating-spline basis: column `j` of a node group is the spline
/// through 1 at node `j` and 0 at every other node of that group. Samples not
/// strictly inside the group's span get 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct CardinalSpline;

impl SplineBasis for CardinalSpline {
    fn design_matrix(
        &self,
        nodes: &ResolvedNodes,
        x: ArrayView1<f64>,
        degree: usize,
    ) -> Result<Array2<f64>> {
        let mut m = Array2::<f64>::zeros((x.len(), nodes.count()));
        let bounds = nodes.segment_bounds();
        for (g, knots) in nodes.groups().iter().enumerate() {
            let group = CardinalGroup::new(knots, degree)?;
            for (r, &xv) in x.iter().enumerate() {
                if !group.contains(xv) {
                    continue;
                }
                for j in 0..knots.len() {
                    m[[r, bounds[g] + j]] = group.sample(xv, j);
                }
            }
        }
        Ok(m)
    }
}

enum Kind {
    Empty,
    Linear,
    Quadratic,
    /// not-a-knot cubic, second derivatives of every cardinal spline
    /// (node x column)
    Cubic(Array2<f64>),
}

struct CardinalGroup<'a> {
    knots: &'a [f64],
    kind: Kind,
}

impl<'a> CardinalGroup<'a> {
    fn new(knots: &'a [f64], degree: usize) -> Result<Self> {
        let n = knots.len();
        let kind = match (degree, n) {
            (1 | 3, 1) => Kind::Empty,
            (1, _) | (3, 2) => Kind::Linear,
            (3, 3) => Kind::Quadratic,
            (3, _) => Kind::Cubic(not_a_knot_second_derivatives(knots)?),
            (d, _) => {
                return Err(IsoFmError::NodeSpec(format!(
                    "unsupported spline degree {}, expected 1 or 3",
                    d
                )))
            }
        };
        Ok(Self { knots, kind })
    }

    fn contains(&self, x: f64) -> bool {
        let n = self.knots.len();
        x > self.knots[0] && x < self.knots[n - 1]
    }

    /// interval `i` such that `knots[i] <= x < knots[i + 1]`
    fn interval(&self, x: f64) -> usize {
        let n = self.knots.len();
        self.knots.partition_point(|&k| k <= x).clamp(1, n - 1) - 1
    }

    /// value of the cardinal spline with a given index at `x`
    fn sample(&self, x: f64, index: usize) -> f64 {
        let k = self.knots;
        match &self.kind {
            Kind::Empty => 0.0,
            Kind::Linear => {
                let i = self.interval(x);
                let h = k[i + 1] - k[i];
                if index == i {
                    (k[i + 1] - x) / h
                } else if index == i + 1 {
                    (x - k[i]) / h
                } else {
                    0.0
                }
            }
            Kind::Quadratic => (0..3)
                .filter(|&m| m != index)
                .map(|m| (x - k[m]) / (k[index] - k[m]))
                .product(),
            Kind::Cubic(c) => {
                let i = self.interval(x);
                let h = k[i + 1] - k[i];
                let a = k[i + 1] - x;
                let b = x - k[i];
                let yi = if index == i { 1.0 } else { 0.0 };
                let yj = if index == i + 1 { 1.0 } else { 0.0 };
                let mi = c[[i, index]];
                let mj = c[[i + 1, index]];
                mi * a.powi(3) / (6.0 * h)
                    + mj * b.powi(3) / (6.0 * h)
                    + (yi / h - mi * h / 6.0) * a
                    + (yj / h - mj * h / 6.0) * b
            }
        }
    }
}

/// Second derivatives at the knots of every cardinal not-a-knot cubic
/// spline, solved at once as `A^-1 R` with `A m = R y`.
fn not_a_knot_second_derivatives(knots: &[f64]) -> Result<Array2<f64>> {
    let n = knots.len();
    let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();
    let mut a = Array2::<f64>::zeros((n, n));
    let mut r = Array2::<f64>::zeros((n, n));

    // third derivative continuous across the second and the second to last knot
    a[[0, 0]] = h[1];
    a[[0, 1]] = -(h[0] + h[1]);
    a[[0, 2]] = h[0];
    a[[n - 1, n - 3]] = h[n - 2];
    a[[n - 1, n - 2]] = -(h[n - 3] + h[n - 2]);
    a[[n - 1, n - 1]] = h[n - 3];

    for i in 1..n - 1 {
        a[[i, i - 1]] = h[i - 1];
        a[[i, i]] = 2.0 * (h[i - 1] + h[i]);
        a[[i, i + 1]] = h[i];
        r[[i, i - 1]] = 6.0 / h[i - 1];
        r[[i, i]] = -6.0 / h[i - 1] - 6.0 / h[i];
        r[[i, i + 1]] = 6.0 / h[i];
    }

    let a_inv = match a.inv() {
        Some(inv) => inv,
        None => {
            return Err(IsoFmError::Linalg(
                "spline continuity system is not invertible".to_string(),
            ))
        }
    };
    Ok(a_inv.dot(&r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    fn nodes(groups: Vec<Vec<f64>>) -> ResolvedNodes {
        ResolvedNodes::new(groups).unwrap()
    }

    #[test]
    fn partition_of_unity_inside_span() {
        let n = nodes(vec![vec![1.0, 1.2, 1.5, 1.6, 2.0, 2.3]]);
        let x = Array1::linspace(1.01, 2.29, 57);
        let m = CardinalSpline.design_matrix(&n, x.view(), 3).unwrap();
        assert_eq!(m.dim(), (57, 6));
        for row in m.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn zero_outside_and_on_the_edges() {
        let n = nodes(vec![vec![1.0, 1.5, 2.0, 2.5, 3.0]]);
        let x = Array1::from(vec![0.5, 1.0, 3.0, 3.5]);
        let m = CardinalSpline.design_matrix(&n, x.view(), 3).unwrap();
        assert!(m.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn cubic_polynomials_are_reproduced() {
        let knots = vec![0.0, 0.3, 1.0, 1.2, 2.0, 2.6, 3.0];
        let f = |x: f64| 0.5 - 1.5 * x + 0.7 * x * x - 0.2 * x.powi(3);
        let n = nodes(vec![knots.clone()]);
        let x = Array1::linspace(0.05, 2.95, 40);
        let m = CardinalSpline.design_matrix(&n, x.view(), 3).unwrap();
        let coeffs = Array1::from(knots.iter().map(|&k| f(k)).collect::<Vec<f64>>());
        let fitted = m.dot(&coeffs);
        for (xv, fv) in x.iter().zip(fitted.iter()) {
            assert_abs_diff_eq!(*fv, f(*xv), epsilon = 1e-9);
        }
    }

    #[test]
    fn cardinal_property_at_interior_knots() {
        let knots = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let n = nodes(vec![knots]);
        let x = Array1::from(vec![1.0, 2.0, 3.0]);
        let m = CardinalSpline.design_matrix(&n, x.view(), 3).unwrap();
        for (r, row) in m.rows().into_iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                let expected = if c == r + 1 { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(v, expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn groups_are_independent_column_blocks() {
        let n = nodes(vec![vec![1.0, 1.5], vec![2.0, 2.2, 2.4]]);
        let x = Array1::from(vec![1.25, 1.75, 2.1, 2.3]);
        let m = CardinalSpline.design_matrix(&n, x.view(), 3).unwrap();
        assert_eq!(m.dim(), (4, 5));
        // linear segment
        assert_abs_diff_eq!(m[[0, 0]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[0, 1]], 0.5, epsilon = 1e-12);
        // gap between groups
        assert!(m.row(1).iter().all(|&v| v == 0.0));
        // quadratic segment
        for r in 2..4 {
            assert_eq!(m[[r, 0]], 0.0);
            assert_eq!(m[[r, 1]], 0.0);
            assert_abs_diff_eq!(m.row(r).sum(), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(m[[2, 2]], 0.375, epsilon = 1e-12);
    }

    #[test]
    fn linear_degree_gives_hat_functions() {
        let n = nodes(vec![vec![0.0, 1.0, 3.0, 4.0]]);
        let x = Array1::from(vec![0.25, 2.0]);
        let m = CardinalSpline.design_matrix(&n, x.view(), 1).unwrap();
        assert_abs_diff_eq!(m[[0, 0]], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[0, 1]], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[1, 1]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m[[1, 2]], 0.5, epsilon = 1e-12);
        assert_eq!(m[[1, 3]], 0.0);
    }

    #[test]
    fn unsupported_degree_is_rejected() {
        let n = nodes(vec![vec![0.0, 1.0, 2.0, 3.0]]);
        let x = Array1::from(vec![0.5]);
        assert!(CardinalSpline.design_matrix(&n, x.view(), 2).is_err());
    }
}
