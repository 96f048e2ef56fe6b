//! Axis-aligned bounding boxes

use crate::point::*;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3f,
    pub max: Point3f,
}

impl Aabb {
    pub fn new(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    /// Tight box around a set of points. Returns a degenerate box at the
    /// origin when `points` is empty.
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3f>,
    {
        let mut iter = points.into_iter();
        let first = match iter.next() {
            Some(p) => *p,
            None => return Self::new(Point3f::origin(), Point3f::origin()),
        };
        let mut min = first;
        let mut max = first;
        for p in iter {
            for i in 0..3 {
                if p[i] < min[i] {
                    min[i] = p[i];
                }
                if p[i] > max[i] {
                    max[i] = p[i];
                }
            }
        }
        Self { min, max }
    }

    pub fn size(&self) -> Vector3f {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    pub fn center(&self) -> Point3f {
        Point3f::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// Inclusive containment test
    pub fn contains(&self, p: &Point3f) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}
