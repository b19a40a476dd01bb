//! Axis-aligned and oriented bounding boxes carrying a display color.

use crate::common::SvdBasis3;
use crate::common::points::mid_point;
use crate::geom3::Aabb;
use crate::{CloudError, Point3, Result, Vector3};
use parry3d_f64::na::Rotation3;
use serde::{Deserialize, Serialize};

/// Anything box-shaped that can list its eight corners. Corners are ordered so that bit 0 of the
/// index picks the max side along the first axis, bit 1 along the second, and bit 2 along the
/// third.
pub trait BoxCorners {
    fn corners(&self) -> [Point3; 8];

    fn color(&self) -> [u8; 3];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAlignedBox {
    pub min: Point3,
    pub max: Point3,
    pub color: [u8; 3],
}

impl AxisAlignedBox {
    pub fn new(min: Point3, max: Point3, color: [u8; 3]) -> Self {
        Self { min, max, color }
    }

    /// The tightest axis-aligned box around the points. Fails on an empty slice.
    pub fn from_points(points: &[Point3], color: [u8; 3]) -> Result<Self> {
        if points.is_empty() {
            return Err(CloudError::InsufficientPoints {
                stage: "axis aligned bounding box",
                required: 1,
                actual: 0,
            });
        }
        let aabb = Aabb::from_points(points);
        Ok(Self::new(aabb.mins, aabb.maxs, color))
    }

    pub fn contains(&self, p: &Point3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min, self.max)
    }
}

impl BoxCorners for AxisAlignedBox {
    fn corners(&self) -> [Point3; 8] {
        let mut result = [Point3::origin(); 8];
        for (i, c) in result.iter_mut().enumerate() {
            *c = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
        }
        result
    }

    fn color(&self) -> [u8; 3] {
        self.color
    }
}

/// A box aligned with the principal axes of the points it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub center: Point3,
    pub half_extents: Vector3,
    pub rotation: Rotation3<f64>,
    pub color: [u8; 3],
}

impl OrientedBox {
    pub fn new(
        center: Point3,
        half_extents: Vector3,
        rotation: Rotation3<f64>,
        color: [u8; 3],
    ) -> Self {
        Self {
            center,
            half_extents,
            rotation,
            color,
        }
    }

    /// Build a box along the principal axes of the points. The points are expressed in the
    /// principal frame, their extents measured there, and the box center moved back out. Needs at
    /// least three points.
    pub fn from_points(points: &[Point3], color: [u8; 3]) -> Result<Self> {
        let basis = SvdBasis3::from_points(points).ok_or(CloudError::InsufficientPoints {
            stage: "oriented bounding box",
            required: 3,
            actual: points.len(),
        })?;
        let rotation = basis.rotation();
        let inverse = rotation.inverse();

        let local = points
            .iter()
            .map(|p| Point3::from(inverse * (p - basis.center)))
            .collect::<Vec<_>>();
        let aabb = Aabb::from_points(&local);
        let local_center = mid_point(&aabb.mins, &aabb.maxs);

        Ok(Self::new(
            basis.center + rotation * local_center.coords,
            (aabb.maxs - aabb.mins) * 0.5,
            rotation,
            color,
        ))
    }

    pub fn volume(&self) -> f64 {
        8.0 * self.half_extents.x * self.half_extents.y * self.half_extents.z
    }
}

impl BoxCorners for OrientedBox {
    fn corners(&self) -> [Point3; 8] {
        let mut result = [Point3::origin(); 8];
        for (i, c) in result.iter_mut().enumerate() {
            let sign = |bit: usize| if i & bit == 0 { -1.0 } else { 1.0 };
            let local = Vector3::new(
                sign(1) * self.half_extents.x,
                sign(2) * self.half_extents.y,
                sign(4) * self.half_extents.z,
            );
            *c = self.center + self.rotation * local;
        }
        result
    }

    fn color(&self) -> [u8; 3] {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Iso3;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_corners() {
        let b = AxisAlignedBox::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 3.0),
            [255, 0, 0],
        );
        let corners = b.corners();
        assert_eq!(corners[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(corners[7], Point3::new(1.0, 2.0, 3.0));
        assert_eq!(corners[5], Point3::new(1.0, 0.0, 3.0));
        assert!(corners.iter().all(|c| b.contains(c)));
    }

    #[test]
    fn aabb_of_empty_fails() {
        assert!(AxisAlignedBox::from_points(&[], [0, 0, 0]).is_err());
    }

    #[test]
    fn obb_of_rotated_box_points() {
        // Corners of a 4 x 2 x 1 box, rotated and moved
        let iso = Iso3::new(Vector3::new(1.0, -2.0, 0.5), Vector3::new(0.3, -0.2, 0.9));
        let aligned = AxisAlignedBox::new(
            Point3::new(-2.0, -1.0, -0.5),
            Point3::new(2.0, 1.0, 0.5),
            [0, 0, 0],
        );
        let points = aligned.corners().iter().map(|p| iso * p).collect::<Vec<_>>();

        let obb = OrientedBox::from_points(&points, [0, 255, 0]).unwrap();
        assert_relative_eq!(obb.volume(), 8.0, epsilon = 1e-6);
        assert_relative_eq!(obb.center, Point3::new(1.0, -2.0, 0.5), epsilon = 1e-9);

        let mut extents = [obb.half_extents.x, obb.half_extents.y, obb.half_extents.z];
        extents.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_relative_eq!(extents[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(extents[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(extents[2], 0.5, epsilon = 1e-6);
    }
}
