//! Quadric error metrics
//!
//! Every vertex carries a symmetric 4x4 matrix accumulated from the supporting
//! planes of its incident triangles (Garland & Heckbert 1997). Evaluating
//! `vᵗQv` at a homogeneous point gives the summed squared distance from that
//! point to those planes, which scores and positions edge collapses.

use mddlme_core::{to_f32, to_f64, Point3d, Point3f};
use nalgebra::{Matrix4, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Relative determinant threshold below which the 3x3 block is treated as singular.
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// Triangles whose doubled area falls below this contribute a zero quadric.
const DEGENERATE_AREA: f64 = 1e-12;

/// How plane quadrics are scaled before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuadricWeighting {
    /// Scale each plane quadric by its triangle's area.
    #[default]
    Area,
    /// Every triangle contributes with unit weight.
    Uniform,
}

/// Symmetric 4x4 error quadric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(Matrix4<f64>);

impl Quadric {
    pub fn zero() -> Self {
        Quadric(Matrix4::zeros())
    }

    /// Quadric of the plane `a x + b y + c z + d = 0`.
    pub fn from_plane(plane: &Vector4<f64>) -> Self {
        let (a, b, c, d) = (plane[0], plane[1], plane[2], plane[3]);
        Quadric(Matrix4::new(
            a * a, a * b, a * c, a * d,
            a * b, b * b, b * c, b * d,
            a * c, b * c, c * c, c * d,
            a * d, b * d, c * d, d * d,
        ))
    }

    /// Plane quadric of a triangle. Degenerate triangles yield zero.
    pub fn from_triangle(
        p0: &Point3f,
        p1: &Point3f,
        p2: &Point3f,
        weighting: QuadricWeighting,
    ) -> Self {
        match triangle_plane(p0, p1, p2) {
            Some((plane, area)) => {
                let q = Self::from_plane(&plane);
                match weighting {
                    QuadricWeighting::Area => Quadric(q.0 * area),
                    QuadricWeighting::Uniform => q,
                }
            }
            None => Self::zero(),
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// Quadric error `vᵗQv` at `p`, clamped at zero against round-off.
    pub fn error(&self, p: &Point3d) -> f64 {
        let vh = Vector4::new(p.x, p.y, p.z, 1.0);
        (vh.transpose() * self.0 * vh)[0].max(0.0)
    }

    /// Error-minimizing position, or `None` when the 3x3 system is
    /// numerically singular.
    pub fn optimal_position(&self) -> Option<Point3d> {
        let a = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        let b: Vector3<f64> = self.0.fixed_view::<3, 1>(0, 3).into_owned();

        let scale = a.norm();
        if scale == 0.0 || !scale.is_finite() {
            return None;
        }
        if a.determinant().abs() <= SINGULAR_TOLERANCE * scale * scale * scale {
            return None;
        }
        let x = a.lu().solve(&(-b))?;
        if x.iter().all(|c| c.is_finite()) {
            Some(Point3d::from(x))
        } else {
            None
        }
    }
}

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        Quadric(self.0 + rhs.0)
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        self.0 += rhs.0;
    }
}

impl Sum for Quadric {
    fn sum<I: Iterator<Item = Quadric>>(iter: I) -> Self {
        iter.fold(Quadric::zero(), |acc, q| acc + q)
    }
}

/// Unit-normal plane `(n, d)` with `n·p + d = 0` and the triangle's area.
/// Returns `None` for near-zero-area triangles.
pub fn triangle_plane(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> Option<(Vector4<f64>, f64)> {
    let a = to_f64(p0);
    let e1 = to_f64(p1) - a;
    let e2 = to_f64(p2) - a;
    let cross = e1.cross(&e2);
    let double_area = cross.norm();
    if double_area < DEGENERATE_AREA || !double_area.is_finite() {
        return None;
    }
    let n = cross / double_area;
    let d = -n.dot(&a.coords);
    Some((Vector4::new(n.x, n.y, n.z, d), 0.5 * double_area))
}

/// Accumulate the plane quadrics of all faces incident to each vertex.
pub fn vertex_quadrics(
    positions: &[Point3f],
    faces: &[[usize; 3]],
    weighting: QuadricWeighting,
) -> Vec<Quadric> {
    let mut quadrics = vec![Quadric::zero(); positions.len()];
    for face in faces {
        let q = Quadric::from_triangle(
            &positions[face[0]],
            &positions[face[1]],
            &positions[face[2]],
            weighting,
        );
        for &v in face {
            quadrics[v] += q;
        }
    }
    quadrics
}

/// Cost of merging two vertices: the optimal merged position under
/// `q1 + q2` (midpoint when singular) and the quadric error there.
pub fn collapse_cost(q1: &Quadric, q2: &Quadric, p1: &Point3f, p2: &Point3f) -> (Point3f, f64) {
    let q = *q1 + *q2;
    let target = match q.optimal_position() {
        Some(p) => to_f32(&p),
        None => Point3f::from((p1.coords + p2.coords) * 0.5),
    };
    // Score the position that will actually be stored.
    (target, q.error(&to_f64(&target)))
}
