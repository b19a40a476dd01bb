use super::Mesh;
use crate::common::SvdBasis3;
use crate::geom3::BoxCorners;
use crate::{CloudError, Point3, Result};
use parry3d_f64::transformation::try_convex_hull;

/// The convex hull of a set of points as a closed triangle mesh. Fails with `DegenerateMesh` if
/// the points do not span a volume.
pub fn convex_hull(points: &[Point3]) -> Result<Mesh> {
    let basis = SvdBasis3::from_points(points).ok_or_else(|| {
        CloudError::degenerate(format!(
            "a convex hull needs at least 4 points, got {}",
            points.len()
        ))
    })?;
    if basis.rank(basis.sv[0] * 1e-9) < 3 {
        return Err(CloudError::degenerate("the points lie in a plane or a line"));
    }

    let (vertices, triangles) = try_convex_hull(points)
        .map_err(|e| CloudError::degenerate(format!("convex hull failed: {e:?}")))?;
    Mesh::try_new(vertices, triangles)
}

/// The convex hull of a box's eight corners. A box with volume gives 8 vertices and 12 triangles.
pub fn convex_hull_from_box<B: BoxCorners>(b: &B) -> Result<Mesh> {
    convex_hull(&b.corners())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom3::{AxisAlignedBox, OrientedBox};
    use crate::{Iso3, Vector3};
    use approx::assert_relative_eq;

    #[test]
    fn unit_cube_hull() {
        let cube = AxisAlignedBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0), [0, 0, 0]);
        let mesh = convex_hull_from_box(&cube).unwrap();
        assert_eq!(mesh.vertices().len(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.is_closed());
        assert_relative_eq!(mesh.surface_area(), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn oriented_box_hull() {
        let iso = Iso3::new(Vector3::new(3.0, 0.0, -1.0), Vector3::new(0.1, 0.7, -0.4));
        let points = AxisAlignedBox::new(
            Point3::new(-1.0, -0.5, -0.25),
            Point3::new(1.0, 0.5, 0.25),
            [0, 0, 0],
        )
        .corners()
        .map(|p| iso * p);
        let obb = OrientedBox::from_points(&points, [0, 0, 255]).unwrap();
        let mesh = convex_hull_from_box(&obb).unwrap();
        assert_eq!(mesh.vertices().len(), 8);
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn hull_drops_interior_points() {
        let mut points = AxisAlignedBox::new(
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
            [0, 0, 0],
        )
        .corners()
        .to_vec();
        points.push(Point3::new(0.1, 0.2, -0.3));
        points.push(Point3::origin());
        let mesh = convex_hull(&points).unwrap();
        assert_eq!(mesh.vertices().len(), 8);
    }

    #[test]
    fn flat_box_is_degenerate() {
        let flat = AxisAlignedBox::new(Point3::origin(), Point3::new(1.0, 1.0, 0.0), [0, 0, 0]);
        assert!(matches!(
            convex_hull_from_box(&flat),
            Err(CloudError::DegenerateMesh { .. })
        ));
    }
}
