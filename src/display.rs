//! Conversion of clouds, boxes and meshes into one plain representation that a viewer can draw
//! without knowing which kind of geometry it came from.

use crate::geom3::mesh::convex_hull_from_box;
use crate::geom3::point_cloud::PointCloudFeatures;
use crate::geom3::{AxisAlignedBox, BoxCorners, OrientedBox};
use crate::{Mesh, PointCloud, Result};
use serde::Serialize;

/// The color used to mark rejected points in an inlier/outlier view.
pub const OUTLIER_RED: [u8; 3] = [255, 0, 0];

/// Anything the pipeline can show.
#[derive(Debug, Clone, Copy)]
pub enum Geometry<'a> {
    Cloud(&'a PointCloud),
    AxisBox(&'a AxisAlignedBox),
    OrientedBox(&'a OrientedBox),
    Mesh(&'a Mesh),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawableKind {
    Points,
    Mesh,
}

/// Positions with optional per-position colors, and for meshes the triangles over them.
#[derive(Debug, Clone, Serialize)]
pub struct Drawable {
    pub kind: DrawableKind,
    pub positions: Vec<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<[u8; 3]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triangles: Option<Vec<[u32; 3]>>,
    pub opacity: f64,
}

impl Drawable {
    fn points(cloud: &PointCloud) -> Self {
        Self {
            kind: DrawableKind::Points,
            positions: cloud.points().iter().map(|p| [p.x, p.y, p.z]).collect(),
            colors: cloud.colors().map(|c| c.to_vec()),
            triangles: None,
            opacity: 1.0,
        }
    }

    fn mesh(mesh: &Mesh, color: Option<[u8; 3]>, opacity: f64) -> Self {
        Self {
            kind: DrawableKind::Mesh,
            positions: mesh.vertices().iter().map(|p| [p.x, p.y, p.z]).collect(),
            colors: color.map(|c| vec![c; mesh.vertices().len()]),
            triangles: Some(mesh.triangles().to_vec()),
            opacity,
        }
    }

    fn boxed<B: BoxCorners>(b: &B, opacity: f64) -> Result<Self> {
        let hull = convex_hull_from_box(b)?;
        Ok(Self::mesh(&hull, Some(b.color()), opacity))
    }
}

impl Geometry<'_> {
    /// Convert to a drawable. Boxes are turned into the mesh of their convex hull, which fails
    /// for a flat box. Meshes and boxes are drawn with `mesh_opacity`, points fully opaque.
    pub fn to_drawable(&self, mesh_opacity: f64) -> Result<Drawable> {
        match self {
            Geometry::Cloud(c) => Ok(Drawable::points(c)),
            Geometry::AxisBox(b) => Drawable::boxed(*b, mesh_opacity),
            Geometry::OrientedBox(b) => Drawable::boxed(*b, mesh_opacity),
            Geometry::Mesh(m) => Ok(Drawable::mesh(m, None, mesh_opacity)),
        }
    }
}

pub fn to_drawables(geometry: &[Geometry], mesh_opacity: f64) -> Result<Vec<Drawable>> {
    geometry.iter().map(|g| g.to_drawable(mesh_opacity)).collect()
}

/// Split a cloud into the points at `indices` and the rest, for showing what a filter kept.
/// Either part is painted a uniform color if one is given.
pub fn inlier_outlier_geometry(
    cloud: &PointCloud,
    indices: &[usize],
    in_color: Option<[u8; 3]>,
    out_color: Option<[u8; 3]>,
) -> Result<(PointCloud, PointCloud)> {
    let mut inliers = cloud.select_by_indices(indices, false)?;
    let mut outliers = cloud.select_by_indices(indices, true)?;
    if let Some(c) = in_color {
        inliers.paint_uniform(c);
    }
    if let Some(c) = out_color {
        outliers.paint_uniform(c);
    }
    Ok((inliers, outliers))
}
