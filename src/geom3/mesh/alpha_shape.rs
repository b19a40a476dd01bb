//! Alpha shape surface reconstruction.
//!
//! The points are tetrahedralized with the Bowyer-Watson algorithm, every tetrahedron with a
//! circumradius above `alpha` is discarded, and the surface is the set of faces that belong to
//! exactly one of the remaining tetrahedra. Each surface face is wound so that its normal points
//! away from the tetrahedron it came from.
//!
//! Grids and other inputs with many cospherical or coplanar points are handled with tolerances: a
//! point must be clearly inside a circumsphere to remove that tetrahedron, and the cavity around a
//! new point grows until the point clearly sees every face of its boundary, so no flat
//! tetrahedron is ever created.

use super::Mesh;
use crate::geom3::point_cloud::PointCloudFeatures;
use crate::{CloudError, Point3, PointCloud, Result, Vector3};
use log::debug;
use parry3d_f64::bounding_volume::Aabb;
use std::collections::{HashMap, HashSet};

/// The faces of a tetrahedron `[a, b, c, d]` as (face, opposite vertex) positions.
const FACES: [([usize; 3], usize); 4] = [
    ([1, 2, 3], 0),
    ([0, 2, 3], 1),
    ([0, 1, 3], 2),
    ([0, 1, 2], 3),
];

#[derive(Clone, Copy)]
struct Tetrahedron {
    vertices: [usize; 4],
    center: Point3,
    radius_sq: f64,
}

impl Tetrahedron {
    fn new(vertices: [usize; 4], points: &[Point3]) -> Self {
        let [a, b, c, d] = vertices.map(|i| points[i]);
        match circumsphere(&a, &b, &c, &d) {
            Some((center, radius_sq)) => Self {
                vertices,
                center,
                radius_sq,
            },
            None => Self {
                vertices,
                center: a,
                radius_sq: f64::INFINITY,
            },
        }
    }

    /// A flat tetrahedron has no circumsphere and never contains a point. A point on the sphere,
    /// up to rounding, is outside.
    fn sphere_contains(&self, p: &Point3) -> bool {
        self.radius_sq.is_finite()
            && self.radius_sq - (p - self.center).norm_squared() > self.radius_sq * 1e-12
    }

    fn face(&self, k: usize) -> ([usize; 3], usize) {
        let (f, opposite) = FACES[k];
        (f.map(|i| self.vertices[i]), self.vertices[opposite])
    }
}

/// Center and squared radius of the sphere through four points, or `None` if they are (nearly)
/// coplanar.
fn circumsphere(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Option<(Point3, f64)> {
    let u = b - a;
    let v = c - a;
    let w = d - a;
    let vw = v.cross(&w);
    let denom = 2.0 * u.dot(&vw);
    let scale = u.norm() * v.norm() * w.norm();
    if denom.is_nan() || denom.abs() <= scale * 1e-12 {
        return None;
    }

    let offset = (vw * u.norm_squared() + w.cross(&u) * v.norm_squared()
        + u.cross(&v) * w.norm_squared())
        / denom;
    Some((a + offset, offset.norm_squared()))
}

/// Six times the signed volume of `[a, b, c, d]`, or zero if the four points are coplanar up to
/// rounding. Anything this calls non-zero has a circumsphere.
fn orientation(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    let u = b - a;
    let v = c - a;
    let w = d - a;
    let volume = u.dot(&v.cross(&w));
    if volume.abs() <= u.norm() * v.norm() * w.norm() * 1e-10 {
        0.0
    } else {
        volume
    }
}

/// True if `p` is strictly on the same side of face `f` as `opposite`.
fn sees(points: &[Point3], f: [usize; 3], opposite: usize, p: &Point3) -> bool {
    let [a, b, c] = f.map(|i| points[i]);
    orientation(&a, &b, &c, &points[opposite]) * orientation(&a, &b, &c, p) > 0.0
}

/// The faces of `cavity` that are not shared between two of its tetrahedra, with the vertex
/// opposite each.
fn boundary(
    cavity: &[Tetrahedron],
    counts: &mut HashMap<[usize; 3], usize>,
) -> Vec<([usize; 3], usize)> {
    counts.clear();
    for t in cavity.iter() {
        for k in 0..4 {
            *counts.entry(sorted(t.face(k).0)).or_insert(0) += 1;
        }
    }
    cavity
        .iter()
        .flat_map(|t| (0..4).map(move |k| t.face(k)))
        .filter(|(f, _)| counts.get(&sorted(*f)) == Some(&1))
        .collect()
}

fn sorted(f: [usize; 3]) -> [usize; 3] {
    let mut s = f;
    s.sort_unstable();
    s
}

/// Delaunay tetrahedralization of `points`. The returned tetrahedra index into `points`; the
/// enclosing tetrahedron's helper vertices and anything touching them are removed.
fn delaunay(points: &[Point3]) -> Vec<Tetrahedron> {
    let n = points.len();
    let bounds = Aabb::from_points(points);
    let center = bounds.center();
    let reach = 1000.0 * bounds.half_extents().norm();

    let mut all = points.to_vec();
    for s in [
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(1.0, -1.0, -1.0),
        Vector3::new(-1.0, 1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
    ] {
        all.push(center + s * reach);
    }

    let mut tets = vec![Tetrahedron::new([n, n + 1, n + 2, n + 3], &all)];
    let mut counts: HashMap<[usize; 3], usize> = HashMap::new();

    for i in 0..n {
        let p = all[i];
        let (mut bad, mut good): (Vec<_>, Vec<_>) =
            tets.into_iter().partition(|t| t.sphere_contains(&p));

        // A repeated point sits on the spheres rather than inside them
        if bad.is_empty() {
            tets = good;
            continue;
        }

        // Grow the cavity across every boundary face that p lies on or behind
        let faces = loop {
            let faces = boundary(&bad, &mut counts);
            let hidden = faces
                .iter()
                .filter(|&&(f, opposite)| !sees(&all, f, opposite, &p))
                .map(|&(f, _)| sorted(f))
                .collect::<HashSet<_>>();
            if hidden.is_empty() {
                break faces;
            }

            let (behind, rest): (Vec<_>, Vec<_>) = good
                .into_iter()
                .partition(|t| (0..4).any(|k| hidden.contains(&sorted(t.face(k).0))));
            good = rest;
            if behind.is_empty() {
                break faces;
            }
            bad.extend(behind);
        };

        tets = good;
        for (f, _) in faces {
            tets.push(Tetrahedron::new([f[0], f[1], f[2], i], &all));
        }
    }

    tets.retain(|t| t.vertices.iter().all(|&v| v < n));
    tets
}

/// Reconstruct a closed surface around the points of a cloud.
///
/// # Arguments
///
/// * `cloud`: the points to wrap, at least four and not all in one plane
/// * `alpha`: the largest circumradius of a tetrahedron that is kept; larger values fill in more
///   of the shape until it becomes the convex hull
///
/// returns: Result<Mesh, CloudError>
pub fn alpha_shape(cloud: &PointCloud, alpha: f64) -> Result<Mesh> {
    let points = cloud.points();
    if points.len() < 4 {
        return Err(CloudError::degenerate(format!(
            "an alpha shape needs at least 4 points, got {}",
            points.len()
        )));
    }
    if alpha.is_nan() || alpha < 0.0 {
        return Err(CloudError::degenerate(format!(
            "alpha must be zero or positive, got {alpha}"
        )));
    }

    let alpha_sq = alpha * alpha;
    let kept = delaunay(points)
        .into_iter()
        .filter(|t| t.radius_sq <= alpha_sq)
        .collect::<Vec<_>>();

    let mut counts: HashMap<[usize; 3], usize> = HashMap::new();
    for t in kept.iter() {
        for k in 0..4 {
            *counts.entry(sorted(t.face(k).0)).or_insert(0) += 1;
        }
    }

    let mut faces = Vec::new();
    for t in kept.iter() {
        for k in 0..4 {
            let (f, opposite) = t.face(k);
            if counts.get(&sorted(f)) != Some(&1) {
                continue;
            }
            let [a, b, c] = f.map(|i| points[i]);
            let normal = (b - a).cross(&(c - a));
            if normal.dot(&(points[opposite] - a)) > 0.0 {
                faces.push([f[0], f[2], f[1]]);
            } else {
                faces.push(f);
            }
        }
    }

    if faces.is_empty() {
        return Err(CloudError::degenerate(format!(
            "no tetrahedra survive with alpha = {alpha}"
        )));
    }

    // Only the vertices on the surface are kept, in their original order
    let mut remap = vec![None; points.len()];
    let mut vertices = Vec::new();
    let mut used = faces.iter().flatten().copied().collect::<Vec<_>>();
    used.sort_unstable();
    used.dedup();
    for i in used {
        remap[i] = Some(vertices.len() as u32);
        vertices.push(points[i]);
    }
    let triangles = faces
        .iter()
        .map(|f| f.map(|i| remap[i].unwrap_or_default()))
        .collect::<Vec<_>>();

    debug!(
        "alpha shape (alpha={alpha}): {} tetrahedra kept, {} surface triangles on {} vertices",
        kept.len(),
        triangles.len(),
        vertices.len()
    );
    Mesh::try_new(vertices, triangles)
}
