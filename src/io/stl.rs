use crate::{Mesh, Result, Vector3};
use log::debug;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use stl_io::{Normal, Triangle, Vertex};

fn vertex(p: &crate::Point3) -> Vertex {
    Vertex::new([p.x as f32, p.y as f32, p.z as f32])
}

/// Write a mesh to a binary STL file.
pub fn write_stl(path: &Path, mesh: &Mesh) -> Result<()> {
    let vertices = mesh.vertices();
    let triangles = mesh.triangles().iter().map(|t| {
        let [a, b, c] = t.map(|i| vertices[i as usize]);
        let n = (b - a)
            .cross(&(c - a))
            .try_normalize(1e-300)
            .unwrap_or_else(Vector3::zeros);
        Triangle {
            normal: Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [vertex(&a), vertex(&b), vertex(&c)],
        }
    });

    let mut writer = BufWriter::new(File::create(path)?);
    stl_io::write_stl(&mut writer, triangles)?;
    debug!(
        "wrote {} triangles to {}",
        mesh.triangle_count(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point3;
    use crate::geom3::AxisAlignedBox;
    use crate::geom3::mesh::convex_hull_from_box;
    use uuid::Uuid;

    #[test]
    fn cube_writes_twelve_facets() {
        let cube = AxisAlignedBox::new(Point3::origin(), Point3::new(1.0, 2.0, 3.0), [0, 0, 0]);
        let mesh = convex_hull_from_box(&cube).unwrap();
        let path = std::env::temp_dir().join(format!("{}.stl", Uuid::new_v4()));

        write_stl(&path, &mesh).unwrap();
        let mut file = File::open(&path).unwrap();
        let read = stl_io::read_stl(&mut file).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(read.faces.len(), 12);
        assert_eq!(read.vertices.len(), 8);
    }
}
