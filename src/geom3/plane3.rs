use crate::common::SvdBasis3;
use crate::geom3::UnitVec3;
use crate::{Iso3, Point3, Vector3};
use parry3d_f64::na::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A plane in the form `ax + by + cz + d = 0`, where `(a, b, c)` is the unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane3 {
    pub normal: UnitVec3,
    pub d: f64,
}

impl Plane3 {
    pub fn new(normal: UnitVec3, d: f64) -> Self {
        Self { normal, d }
    }

    /// Create a plane from raw coefficients. The coefficients are scaled so that the normal has
    /// unit length. Returns `None` if `(a, b, c)` is zero or not finite.
    pub fn from_coefficients(a: f64, b: f64, c: f64, d: f64) -> Option<Self> {
        let n = Vector3::new(a, b, c);
        let length = n.norm();
        if !length.is_finite() || length < 1e-12 {
            return None;
        }
        Some(Self::new(UnitVec3::new_unchecked(n / length), d / length))
    }

    /// The plane coefficients `[a, b, c, d]`.
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.d]
    }

    /// Measure and return the signed distance from the plane to a point in 3D space. The sign of
    /// the distance indicates whether the point is above or below the plane according to the
    /// plane's normal vector.
    pub fn signed_distance_to_point(&self, point: &Point3) -> f64 {
        self.normal.dot(&point.coords) + self.d
    }

    /// Measure and return the perpendicular distance from the plane to a point, always positive.
    pub fn distance_to_point(&self, point: &Point3) -> f64 {
        self.signed_distance_to_point(point).abs()
    }

    /// Project a point onto the plane, returning the closest point on the plane.
    pub fn project_point(&self, point: &Point3) -> Point3 {
        point - self.normal.into_inner() * self.signed_distance_to_point(point)
    }

    /// Create the unique plane through three points, or `None` if they are collinear (or too
    /// close together to define a direction).
    pub fn from_three_points(p1: &Point3, p2: &Point3, p3: &Point3) -> Option<Self> {
        let cross = (p2 - p1).cross(&(p3 - p1));
        let scale = (p2 - p1).norm() * (p3 - p1).norm();
        if scale <= 0.0 || cross.norm() <= scale * 1e-12 {
            return None;
        }
        let normal = UnitVec3::new_normalize(cross);
        Some(Self::new(normal, -normal.dot(&p1.coords)))
    }

    /// Least-squares plane through a set of points, using the singular vector with the smallest
    /// singular value as the normal. Returns `None` if the points do not span a plane.
    pub fn fit_points(points: &[Point3]) -> Option<Self> {
        if points.len() == 3 {
            return Self::from_three_points(&points[0], &points[1], &points[2]);
        }

        let svd = SvdBasis3::from_points(points)?;
        let tol = svd.sv[0] * 1e-9;
        if svd.sv[0] <= 0.0 || svd.rank(tol) < 2 {
            return None;
        }
        let normal = UnitVec3::new_normalize(svd.smallest());
        Some(Self::new(normal, -normal.dot(&svd.center.coords)))
    }

    /// The rigid transform which moves this plane onto the XY plane (z = 0) with its normal along
    /// +Z. The rotation is taken about the axis `normal x Z` by `acos(c)`, then the result is
    /// shifted by `d` along Z. A normal that is already +Z needs no rotation; a normal of -Z is
    /// turned over with a half turn about X.
    pub fn alignment_to_xy(&self) -> Iso3 {
        let [a, b, c, d] = self.coefficients();
        let axis = Vector3::new(b, -a, 0.0);
        let axis_len = axis.norm();

        let rotation = if axis_len < 1e-12 {
            if c > 0.0 {
                UnitQuaternion::identity()
            } else {
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI)
            }
        } else {
            let angle = c.clamp(-1.0, 1.0).acos();
            UnitQuaternion::from_scaled_axis(axis / axis_len * angle)
        };

        // Rotating the plane's points leaves them at z = -d
        Iso3::from_parts(Translation3::new(0.0, 0.0, d), rotation)
    }
}
