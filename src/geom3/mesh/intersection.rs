use super::Mesh;
use crate::Iso3;
use crate::geom3::Aabb;
use parry3d_f64::bounding_volume::BoundingVolume;
use parry3d_f64::query::intersection_test;
use parry3d_f64::shape::Triangle;
use rayon::prelude::*;

fn triangle_bounds(t: &Triangle) -> Aabb {
    Aabb::from_points(&[t.a, t.b, t.c])
}

fn triangles_touch(a: &Triangle, b: &Triangle) -> bool {
    let identity = Iso3::identity();
    intersection_test(&identity, a, &identity, b).unwrap_or(false)
}

/// True if any triangle of `a` touches any triangle of `b`. Only the surfaces are compared, so a
/// mesh sitting entirely inside another without touching its skin does not count.
///
/// Pairs are rejected early when the meshes' bounds, or the two triangles' bounds, are apart.
/// The scan over the triangles of `a` runs in parallel and stops at the first touching pair.
pub fn meshes_intersect(a: &Mesh, b: &Mesh) -> bool {
    if !a.aabb().intersects(b.aabb()) {
        return false;
    }

    let others = (0..b.triangle_count())
        .map(|j| {
            let t = b.triangle(j);
            (triangle_bounds(&t), t)
        })
        .filter(|(bounds, _)| bounds.intersects(a.aabb()))
        .collect::<Vec<_>>();

    (0..a.triangle_count()).into_par_iter().any(|i| {
        let t = a.triangle(i);
        let bounds = triangle_bounds(&t);
        others.iter().any(|(other_bounds, other)| {
            bounds.intersects(other_bounds) && triangles_touch(&t, other)
        })
    })
}

/// Whether an object's mesh touches the door portal. An object without a mesh never does.
pub fn intersects_portal(mesh: Option<&Mesh>, portal: &Mesh) -> bool {
    mesh.is_some_and(|m| meshes_intersect(m, portal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point3;
    use crate::geom3::AxisAlignedBox;
    use crate::geom3::mesh::convex_hull_from_box;
    use test_case::test_case;

    fn box_mesh(min: [f64; 3], max: [f64; 3]) -> Mesh {
        let b = AxisAlignedBox::new(Point3::from(min), Point3::from(max), [0, 0, 0]);
        convex_hull_from_box(&b).unwrap()
    }

    #[test_case([100.0, 0.0, 0.0], false; "far apart")]
    #[test_case([0.0, 0.0, 0.0], true; "coincident")]
    #[test_case([0.5, 0.5, 0.0], true; "overlapping")]
    #[test_case([1.5, 0.2, 0.2], false; "near but apart")]
    fn unit_boxes(offset: [f64; 3], expected: bool) {
        let a = box_mesh([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = box_mesh(offset, [offset[0] + 1.0, offset[1] + 1.0, offset[2] + 1.0]);
        assert_eq!(meshes_intersect(&a, &b), expected);
        assert_eq!(meshes_intersect(&b, &a), expected);
    }

    #[test]
    fn nested_surfaces_do_not_touch() {
        let outer = box_mesh([-2.0, -2.0, -2.0], [2.0, 2.0, 2.0]);
        let inner = box_mesh([-0.5, -0.5, -0.5], [0.5, 0.5, 0.5]);
        assert!(!meshes_intersect(&outer, &inner));
    }

    #[test]
    fn thin_portal_crossed_by_box() {
        let portal = box_mesh([0.999, 0.0, 0.1], [1.001, 0.95, 0.55]);
        let crossing = box_mesh([0.96, 0.4, 0.2], [1.04, 0.5, 0.3]);
        let beside = box_mesh([0.4, 0.4, 0.4], [0.6, 0.6, 0.6]);
        assert!(meshes_intersect(&crossing, &portal));
        assert!(!meshes_intersect(&beside, &portal));
    }

    #[test]
    fn missing_mesh_never_intersects() {
        let portal = box_mesh([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(!intersects_portal(None, &portal));
        assert!(intersects_portal(Some(&portal), &portal));
    }
}
