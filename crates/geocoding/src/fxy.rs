//! Two-variable polynomial surfaces `z = f(x, y)`.
//!
//! An [`FxySum`] is a weighted sum of monomials `x^i * y^j`; the set of
//! monomials is fixed by its [`FxyOrder`]. Surfaces are the building block of
//! FXY and GCP geocodings and seed the tie-point inverse search.

use geo_common::FitError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default relative singular value cut-off for [`FxySum::fit`].
pub const DEFAULT_RANK_TOLERANCE: f64 = 1.0e-12;

/// Monomial basis of a polynomial surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FxyOrder {
    /// `1, x, y`
    Linear,
    /// `1, x, y, x², xy, y²`
    Quadric,
    /// `1, x, y, x², xy, y², x³, x²y, xy², y³`
    Cubic,
    /// All monomials up to total degree 4 (15 terms).
    Quartic,
    /// `1, x, y, xy`
    BiLinear,
    /// Monomials with `i, j <= 2` (9 terms).
    BiQuadric,
    /// Monomials with `i, j <= 3` (16 terms).
    BiCubic,
}

const LINEAR: &[(u8, u8)] = &[(0, 0), (1, 0), (0, 1)];
const QUADRIC: &[(u8, u8)] = &[(0, 0), (1, 0), (0, 1), (2, 0), (1, 1), (0, 2)];
const CUBIC: &[(u8, u8)] = &[
    (0, 0),
    (1, 0),
    (0, 1),
    (2, 0),
    (1, 1),
    (0, 2),
    (3, 0),
    (2, 1),
    (1, 2),
    (0, 3),
];
const QUARTIC: &[(u8, u8)] = &[
    (0, 0),
    (1, 0),
    (0, 1),
    (2, 0),
    (1, 1),
    (0, 2),
    (3, 0),
    (2, 1),
    (1, 2),
    (0, 3),
    (4, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 4),
];
const BILINEAR: &[(u8, u8)] = &[(0, 0), (1, 0), (0, 1), (1, 1)];
const BIQUADRIC: &[(u8, u8)] = &[
    (0, 0),
    (1, 0),
    (0, 1),
    (2, 0),
    (1, 1),
    (0, 2),
    (2, 1),
    (1, 2),
    (2, 2),
];
const BICUBIC: &[(u8, u8)] = &[
    (0, 0),
    (1, 0),
    (0, 1),
    (2, 0),
    (1, 1),
    (0, 2),
    (3, 0),
    (2, 1),
    (1, 2),
    (0, 3),
    (3, 1),
    (2, 2),
    (1, 3),
    (3, 2),
    (2, 3),
    (3, 3),
];

impl FxyOrder {
    /// Exponent pairs `(i, j)` of the basis monomials, in coefficient order.
    pub fn exponents(&self) -> &'static [(u8, u8)] {
        match self {
            FxyOrder::Linear => LINEAR,
            FxyOrder::Quadric => QUADRIC,
            FxyOrder::Cubic => CUBIC,
            FxyOrder::Quartic => QUARTIC,
            FxyOrder::BiLinear => BILINEAR,
            FxyOrder::BiQuadric => BIQUADRIC,
            FxyOrder::BiCubic => BICUBIC,
        }
    }

    /// Number of basis terms, which is also the minimum point count for a fit.
    pub fn num_terms(&self) -> usize {
        self.exponents().len()
    }

    /// Highest exponent used for either variable.
    pub fn max_exponent(&self) -> usize {
        match self {
            FxyOrder::Linear | FxyOrder::BiLinear => 1,
            FxyOrder::Quadric | FxyOrder::BiQuadric => 2,
            FxyOrder::Cubic | FxyOrder::BiCubic => 3,
            FxyOrder::Quartic => 4,
        }
    }
}

/// A polynomial surface: basis order plus one coefficient per basis term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxySum {
    order: FxyOrder,
    coefficients: Vec<f64>,
}

impl FxySum {
    /// Create a surface, checking the coefficient count against the basis.
    pub fn new(order: FxyOrder, coefficients: Vec<f64>) -> Result<Self, FitError> {
        if coefficients.len() != order.num_terms() {
            return Err(FitError::Solve(format!(
                "{:?} needs {} coefficients, got {}",
                order,
                order.num_terms(),
                coefficients.len()
            )));
        }
        Ok(Self {
            order,
            coefficients,
        })
    }

    /// `c0 + c1*x + c2*y`
    pub fn linear(coefficients: [f64; 3]) -> Self {
        Self {
            order: FxyOrder::Linear,
            coefficients: coefficients.to_vec(),
        }
    }

    pub fn quadric(coefficients: [f64; 6]) -> Self {
        Self {
            order: FxyOrder::Quadric,
            coefficients: coefficients.to_vec(),
        }
    }

    pub fn cubic(coefficients: [f64; 10]) -> Self {
        Self {
            order: FxyOrder::Cubic,
            coefficients: coefficients.to_vec(),
        }
    }

    pub fn order(&self) -> FxyOrder {
        self.order
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate the surface at `(x, y)`.
    pub fn compute_z(&self, x: f64, y: f64) -> f64 {
        let (xp, yp) = powers(self.order.max_exponent(), x, y);
        self.order
            .exponents()
            .iter()
            .zip(&self.coefficients)
            .map(|(&(i, j), c)| c * xp[i as usize] * yp[j as usize])
            .sum()
    }

    /// Partial derivative with respect to `x`.
    pub fn compute_dz_dx(&self, x: f64, y: f64) -> f64 {
        let (xp, yp) = powers(self.order.max_exponent(), x, y);
        self.order
            .exponents()
            .iter()
            .zip(&self.coefficients)
            .filter(|(&(i, _), _)| i > 0)
            .map(|(&(i, j), c)| c * i as f64 * xp[i as usize - 1] * yp[j as usize])
            .sum()
    }

    /// Partial derivative with respect to `y`.
    pub fn compute_dz_dy(&self, x: f64, y: f64) -> f64 {
        let (xp, yp) = powers(self.order.max_exponent(), x, y);
        self.order
            .exponents()
            .iter()
            .zip(&self.coefficients)
            .filter(|(&(_, j), _)| j > 0)
            .map(|(&(i, j), c)| c * j as f64 * xp[i as usize] * yp[j as usize - 1])
            .sum()
    }

    /// Least-squares fit of `z = f(x, y)` through `(x, y, z)` samples.
    pub fn fit(points: &[(f64, f64, f64)], order: FxyOrder) -> Result<Self, FitError> {
        Self::fit_with_tolerance(points, order, DEFAULT_RANK_TOLERANCE)
    }

    /// Least-squares fit with an explicit rank tolerance.
    ///
    /// The design matrix columns are normalised to unit length before the SVD
    /// so that the rank test is not dominated by the scale of high powers.
    pub fn fit_with_tolerance(
        points: &[(f64, f64, f64)],
        order: FxyOrder,
        rank_tolerance: f64,
    ) -> Result<Self, FitError> {
        let terms = order.num_terms();
        if points.len() < terms {
            return Err(FitError::TooFewPoints {
                required: terms,
                actual: points.len(),
            });
        }
        if points
            .iter()
            .any(|&(x, y, z)| !(x.is_finite() && y.is_finite() && z.is_finite()))
        {
            return Err(FitError::NonFinite);
        }

        let exponents = order.exponents();
        let mut a_mat = DMatrix::<f64>::zeros(points.len(), terms);
        let mut b_vec = DVector::<f64>::zeros(points.len());
        for (row, &(x, y, z)) in points.iter().enumerate() {
            let (xp, yp) = powers(order.max_exponent(), x, y);
            for (col, &(i, j)) in exponents.iter().enumerate() {
                a_mat[(row, col)] = xp[i as usize] * yp[j as usize];
            }
            b_vec[row] = z;
        }

        let mut scales = Vec::with_capacity(terms);
        for col in 0..terms {
            let norm = a_mat.column(col).norm();
            if norm == 0.0 {
                return Err(FitError::RankDeficient {
                    rank: terms - 1,
                    terms,
                });
            }
            a_mat.column_mut(col).scale_mut(1.0 / norm);
            scales.push(norm);
        }

        let svd = a_mat.svd(true, true);
        let max_sv = svd.singular_values.max();
        let eps = max_sv * rank_tolerance;
        let rank = svd.singular_values.iter().filter(|&&s| s > eps).count();
        if rank < terms {
            debug!(rank, terms, max_sv, "rank deficient polynomial fit");
            return Err(FitError::RankDeficient { rank, terms });
        }

        let solution = svd
            .solve(&b_vec, eps)
            .map_err(|e| FitError::Solve(e.to_string()))?;

        let coefficients: Vec<f64> = solution
            .iter()
            .zip(&scales)
            .map(|(c, s)| c / s)
            .collect();
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFinite);
        }

        Ok(Self {
            order,
            coefficients,
        })
    }

    /// Root mean square residual over `(x, y, z)` samples.
    pub fn rmse(&self, points: &[(f64, f64, f64)]) -> f64 {
        if points.is_empty() {
            return 0.0;
        }
        let sum: f64 = points
            .iter()
            .map(|&(x, y, z)| (self.compute_z(x, y) - z).powi(2))
            .sum();
        (sum / points.len() as f64).sqrt()
    }
}

fn powers(max_exponent: usize, x: f64, y: f64) -> ([f64; 5], [f64; 5]) {
    let mut xp = [1.0; 5];
    let mut yp = [1.0; 5];
    for k in 1..=max_exponent {
        xp[k] = xp[k - 1] * x;
        yp[k] = yp[k - 1] * y;
    }
    (xp, yp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_sizes() {
        assert_eq!(FxyOrder::Linear.num_terms(), 3);
        assert_eq!(FxyOrder::Quadric.num_terms(), 6);
        assert_eq!(FxyOrder::Cubic.num_terms(), 10);
        assert_eq!(FxyOrder::Quartic.num_terms(), 15);
        assert_eq!(FxyOrder::BiLinear.num_terms(), 4);
        assert_eq!(FxyOrder::BiQuadric.num_terms(), 9);
        assert_eq!(FxyOrder::BiCubic.num_terms(), 16);
    }

    #[test]
    fn test_coefficient_count_is_checked() {
        assert!(FxySum::new(FxyOrder::Cubic, vec![1.0; 10]).is_ok());
        assert!(FxySum::new(FxyOrder::Cubic, vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_linear_evaluation() {
        let f = FxySum::linear([1.0, 2.0, 3.0]);
        assert_eq!(f.compute_z(4.5, 2.5), 1.0 + 9.0 + 7.5);
        assert_eq!(f.compute_dz_dx(4.5, 2.5), 2.0);
        assert_eq!(f.compute_dz_dy(4.5, 2.5), 3.0);
    }

    #[test]
    fn test_cubic_derivatives() {
        // z = x³ + 2x²y + y³
        let f = FxySum::cubic([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 1.0]);
        let (x, y) = (1.5, -2.0);
        assert!((f.compute_z(x, y) - (3.375 - 9.0 - 8.0)).abs() < 1e-12);
        assert!((f.compute_dz_dx(x, y) - (3.0 * x * x + 4.0 * x * y)).abs() < 1e-12);
        assert!((f.compute_dz_dy(x, y) - (2.0 * x * x + 3.0 * y * y)).abs() < 1e-12);
    }

    #[test]
    fn test_forward_and_reverse_sums_agree() {
        // surfaces taken from an AVNIR-2 product
        let lat = FxySum::cubic([
            38.500063158199914,
            -1.5864380827666764E-5,
            -8.87076135137345E-5,
            -5.4715650494309404E-11,
            1.7664837083366042E-11,
            -2.117514813932369E-12,
            3.064408168899423E-17,
            1.585962164097323E-16,
            -6.098694274571135E-17,
            5.84863124300545E-18,
        ]);
        let lon = FxySum::cubic([
            140.13684646307198,
            1.128828545988631E-4,
            -2.018789097584942E-5,
            -2.3783153647830587E-11,
            -1.3475060752719392E-10,
            2.3779980524035797E-11,
            -8.964042454477968E-17,
            1.603005243179082E-16,
            2.689055849423117E-16,
            -5.342672795186944E-17,
        ]);
        let x_func = FxySum::cubic([
            -1004274.164152284,
            -8438.725369567894,
            1931.015292199648,
            480.2628768865113,
            -51.80353463858226,
            79.50343943972683,
            -1.170751563256245,
            -2.461732799965884,
            0.43455217130283397,
            -0.24909748244716065,
        ]);
        let y_func = FxySum::cubic([
            129893.51986530663,
            -10247.4132114523,
            3492.9557841930427,
            -35.089200336275994,
            -12.449311003384066,
            8.925552458488387,
            -0.13026608164787684,
            0.34836844379127946,
            0.03006361443561656,
            -0.13394457012591415,
        ]);

        let (x, y) = (10.5, 15.5);
        let la = lat.compute_z(x, y);
        let lo = lon.compute_z(x, y);

        assert!((x_func.compute_z(la, lo) - x).abs() < 1e-1);
        assert!((y_func.compute_z(la, lo) - y).abs() < 1e-2);
    }

    #[test]
    fn test_fit_recovers_exact_polynomial() {
        let truth = FxySum::quadric([3.0, -1.0, 0.5, 0.25, -0.125, 2.0]);
        let mut points = Vec::new();
        for j in 0..5 {
            for i in 0..5 {
                let (x, y) = (i as f64 * 10.0, j as f64 * 7.0);
                points.push((x, y, truth.compute_z(x, y)));
            }
        }

        let fitted = FxySum::fit(&points, FxyOrder::Quadric).unwrap();
        for (a, b) in fitted.coefficients().iter().zip(truth.coefficients()) {
            assert!((a - b).abs() < 1e-8, "coefficient {} vs {}", a, b);
        }
        assert!(fitted.rmse(&points) < 1e-8);
    }

    #[test]
    fn test_fit_rejects_too_few_points() {
        let points = [(0.0, 0.0, 1.0), (1.0, 0.0, 2.0)];
        assert_eq!(
            FxySum::fit(&points, FxyOrder::Linear),
            Err(FitError::TooFewPoints {
                required: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_fit_rejects_collinear_points() {
        // all samples on the line y = 2x: x and y columns are dependent
        let points: Vec<_> = (0..6)
            .map(|i| (i as f64, 2.0 * i as f64, i as f64 * 3.0))
            .collect();
        assert!(matches!(
            FxySum::fit(&points, FxyOrder::Linear),
            Err(FitError::RankDeficient { .. })
        ));
    }

    #[test]
    fn test_fit_rejects_nan() {
        let points = [(0.0, 0.0, 1.0), (1.0, 0.0, f64::NAN), (0.0, 1.0, 2.0)];
        assert_eq!(FxySum::fit(&points, FxyOrder::Linear), Err(FitError::NonFinite));
    }
}
