//! Triangle meshes built from clusters and bounding boxes, and the tests between them.

mod alpha_shape;
mod hull;
mod intersection;

use crate::geom3::Aabb;
use crate::{CloudError, Point3, Result, Vector3};
use parry3d_f64::shape::{TriMesh, Triangle};
use std::collections::HashMap;

pub use alpha_shape::alpha_shape;
pub use hull::{convex_hull, convex_hull_from_box};
pub use intersection::{intersects_portal, meshes_intersect};

/// A triangle mesh backed by a parry `TriMesh`, with per-vertex normals.
///
/// Vertex normals are the area-weighted average of the normals of the faces around each vertex,
/// which is the plain sum of the un-normalized face cross products. A vertex used by no face, or
/// whose faces cancel out, has a zero normal.
#[derive(Clone)]
pub struct Mesh {
    shape: TriMesh,
    normals: Vec<Vector3>,
    aabb: Aabb,
}

impl Mesh {
    /// Create a mesh from vertices and triangles. Fails with `DegenerateMesh` if there are no
    /// triangles or a triangle refers to a vertex that does not exist.
    pub fn try_new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Result<Self> {
        if triangles.is_empty() {
            return Err(CloudError::degenerate("the mesh has no triangles"));
        }
        if let Some(t) = triangles
            .iter()
            .find(|t| t.iter().any(|&i| i as usize >= vertices.len()))
        {
            return Err(CloudError::degenerate(format!(
                "triangle {t:?} refers past the {} vertices",
                vertices.len()
            )));
        }

        let normals = vertex_normals(&vertices, &triangles);
        let aabb = Aabb::from_points(&vertices);
        let shape = TriMesh::new(vertices, triangles)
            .map_err(|e| CloudError::degenerate(format!("{e:?}")))?;

        Ok(Self {
            shape,
            normals,
            aabb,
        })
    }

    pub fn vertices(&self) -> &[Point3] {
        self.shape.vertices()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        self.shape.indices()
    }

    pub fn vertex_normals(&self) -> &[Vector3] {
        &self.normals
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles().len()
    }

    pub fn triangle(&self, i: usize) -> Triangle {
        self.shape.triangle(i as u32)
    }

    /// The axis-aligned bounds of the vertices.
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn surface_area(&self) -> f64 {
        self.shape.triangles().map(|t| t.area()).sum()
    }

    /// True if every edge is shared by exactly two triangles.
    pub fn is_closed(&self) -> bool {
        let mut edges: HashMap<(u32, u32), usize> = HashMap::new();
        for t in self.triangles() {
            for k in 0..3 {
                let (a, b) = (t[k], t[(k + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        edges.values().all(|&c| c == 2)
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("vertices", &self.vertices().len())
            .field("triangles", &self.triangle_count())
            .finish()
    }
}

fn vertex_normals(vertices: &[Point3], triangles: &[[u32; 3]]) -> Vec<Vector3> {
    let mut normals = vec![Vector3::zeros(); vertices.len()];
    for t in triangles {
        let [a, b, c] = t.map(|i| vertices[i as usize]);
        // The cross product's length is twice the face area
        let n = (b - a).cross(&(c - a));
        for &i in t {
            normals[i as usize] += n;
        }
    }
    for n in normals.iter_mut() {
        *n = n.try_normalize(1e-300).unwrap_or_else(Vector3::zeros);
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tetrahedron() -> Mesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let triangles = vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
        Mesh::try_new(vertices, triangles).unwrap()
    }

    #[test]
    fn tetrahedron_is_closed() {
        let mesh = tetrahedron();
        assert!(mesh.is_closed());
        assert_eq!(mesh.triangle_count(), 4);
        assert_relative_eq!(mesh.surface_area(), 1.5 + 3f64.sqrt() / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn normals_point_outward() {
        let mesh = tetrahedron();
        let n = mesh.vertex_normals();
        assert_relative_eq!(n[0], -Vector3::new(1.0, 1.0, 1.0).normalize(), epsilon = 1e-12);
        assert!(n[1].x > 0.0 && n[2].y > 0.0 && n[3].z > 0.0);
        assert!(n.iter().all(|v| (v.norm() - 1.0).abs() < 1e-12));
    }

    #[test]
    fn open_surface_is_not_closed() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh = Mesh::try_new(vertices, vec![[0, 1, 2]]).unwrap();
        assert!(!mesh.is_closed());
        assert_relative_eq!(mesh.vertex_normals()[0], Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn rejects_bad_triangles() {
        let vertices = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(matches!(
            Mesh::try_new(vertices.clone(), vec![[0, 1, 2]]),
            Err(CloudError::DegenerateMesh { .. })
        ));
        assert!(Mesh::try_new(vertices, vec![]).is_err());
    }
}
