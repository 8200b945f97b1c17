//! Planar convex hulls for GCP coverage tests.

/// A convex polygon in counter-clockwise order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    vertices: Vec<(f64, f64)>,
}

/// z component of `(a - o) x (b - o)`.
fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

impl ConvexHull {
    /// Hull of a point set (Andrew's monotone chain). Non-finite points are
    /// ignored; collinear points on the boundary are dropped.
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let mut pts: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|p| p.0.is_finite() && p.1.is_finite())
            .collect();
        pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        pts.dedup();
        if pts.len() < 3 {
            return Self { vertices: pts };
        }

        let mut lower: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
        for &p in &pts {
            while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
                lower.pop();
            }
            lower.push(p);
        }
        let mut upper: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
        for &p in pts.iter().rev() {
            while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
                upper.pop();
            }
            upper.push(p);
        }
        lower.pop();
        upper.pop();
        lower.extend(upper);
        Self { vertices: lower }
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// True if the hull encloses a non-zero area.
    pub fn is_proper(&self) -> bool {
        self.vertices.len() >= 3
    }

    /// Point-in-hull test, boundary inclusive up to `tolerance` (in the
    /// units of the cross product, i.e. area).
    pub fn contains(&self, x: f64, y: f64, tolerance: f64) -> bool {
        if !(x.is_finite() && y.is_finite()) || !self.is_proper() {
            return false;
        }
        let n = self.vertices.len();
        (0..n).all(|k| {
            let a = self.vertices[k];
            let b = self.vertices[(k + 1) % n];
            cross(a, b, (x, y)) >= -tolerance
        })
    }
}
