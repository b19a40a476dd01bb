mod clustering;
mod outliers;
mod segmentation;

use crate::common::IndexMask;
use crate::common::kd_tree::{KdTree3, MatchedTree};
use crate::common::voxel_downsample::voxel_groups;
use crate::geom3::{Aabb, AxisAlignedBox, OrientedBox, Plane3};
use crate::{CloudError, Iso3, Point3, Result, Vector3};
use log::debug;
use parry3d_f64::na::{Rotation3, Translation3, UnitQuaternion};
use uuid::Uuid;

pub use clustering::{
    Cluster, NOISE, cluster_aabbs, cluster_meshes, cluster_obbs, filter_by_point_count,
};
pub use outliers::FilterResult;
pub use segmentation::{PlaneSegmentation, RansacParams};

pub trait PointCloudFeatures {
    fn points(&self) -> &[Point3];
    fn colors(&self) -> Option<&[[u8; 3]]>;

    fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    fn len(&self) -> usize {
        self.points().len()
    }

    /// The axis-aligned bounds of the points. Only meaningful for a non-empty cloud.
    fn aabb(&self) -> Aabb {
        Aabb::from_points(self.points())
    }

    /// Create a new cloud from the points (and colors) at the given indices, in the order the
    /// indices are given. Fails with `IndexOutOfRange` if any index is past the end.
    fn create_from_indices(&self, indices: &[usize]) -> Result<PointCloud> {
        if let Some(&i) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(CloudError::IndexOutOfRange {
                index: i,
                len: self.len(),
            });
        }

        let points = self.points();
        let colors = self.colors();

        let points = indices.iter().map(|i| points[*i]).collect();
        let colors = colors.map(|c| indices.iter().map(|i| c[*i]).collect());

        PointCloud::try_new(points, colors)
    }

    /// Create a new cloud from the points whose index is set in the mask, keeping their order.
    fn create_from_mask(&self, mask: &IndexMask) -> Result<PointCloud> {
        let points = mask.clone_indices_of(self.points())?;
        let colors = match self.colors() {
            Some(c) => Some(mask.clone_indices_of(c)?),
            None => None,
        };
        PointCloud::try_new(points, colors)
    }
}

/// A point cloud with optional per-point RGB colors. Every operation which changes the points
/// assigns the cloud a new id, which invalidates any neighbor tree built from its old contents.
#[derive(Clone, Debug)]
pub struct PointCloud {
    tree_uuid: Uuid,
    points: Vec<Point3>,
    colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points and, optionally, colors.
    ///
    /// # Arguments
    ///
    /// * `points`: The points in the point cloud.
    /// * `colors`: Optional colors to be associated with the points. If provided, the number of
    ///   colors must match the number of points.
    ///
    /// returns: Result<PointCloud, CloudError>
    ///
    /// # Examples
    ///
    /// ```
    /// use doorguard::{Point3, PointCloud};
    /// use doorguard::geom3::point_cloud::PointCloudFeatures;
    /// let cloud = PointCloud::try_new(vec![Point3::origin()], Some(vec![[10, 20, 30]])).unwrap();
    /// assert_eq!(cloud.len(), 1);
    /// assert!(PointCloud::try_new(vec![Point3::origin()], Some(vec![])).is_err());
    /// ```
    pub fn try_new(points: Vec<Point3>, colors: Option<Vec<[u8; 3]>>) -> Result<Self> {
        if let Some(colors) = &colors {
            if colors.len() != points.len() {
                return Err(CloudError::InconsistentData {
                    reason: format!(
                        "{} colors were given for {} points",
                        colors.len(),
                        points.len()
                    ),
                });
            }
        }
        Ok(Self {
            tree_uuid: Uuid::new_v4(),
            points,
            colors,
        })
    }

    /// Create an empty point cloud, with an empty color vector if `has_colors` is true.
    pub fn empty(has_colors: bool) -> Self {
        Self {
            tree_uuid: Uuid::new_v4(),
            points: Vec::new(),
            colors: if has_colors { Some(Vec::new()) } else { None },
        }
    }

    /// Merges another point cloud into this one, modifying this point cloud in place and
    /// consuming the other. Both clouds must either have colors or not have them.
    pub fn merge(&mut self, other: PointCloud) -> Result<()> {
        match (&mut self.colors, other.colors) {
            (Some(mine), Some(theirs)) => mine.extend(theirs),
            (None, None) => {}
            _ => {
                return Err(CloudError::InconsistentData {
                    reason: "cannot merge point clouds with inconsistent color data".to_string(),
                });
            }
        }
        self.points.extend(other.points);
        self.tree_uuid = Uuid::new_v4();
        Ok(())
    }

    /// Transform the point cloud by applying a rigid transformation to all points. This modifies
    /// the point cloud in place.
    pub fn transform_by(&mut self, transform: &Iso3) {
        for p in &mut self.points {
            *p = transform * *p;
        }
        self.tree_uuid = Uuid::new_v4();
    }

    /// Rotate every point about the origin and then translate it.
    pub fn transform(&mut self, rotation: &Rotation3<f64>, translation: &Vector3) {
        let iso = Iso3::from_parts(
            Translation3::from(*translation),
            UnitQuaternion::from_rotation_matrix(rotation),
        );
        self.transform_by(&iso);
    }

    /// Move the cloud so that `plane` becomes the XY plane with its normal along +Z. Returns the
    /// transform that was applied.
    pub fn align_plane_with_z(&mut self, plane: &Plane3) -> Iso3 {
        let iso = plane.alignment_to_xy();
        self.transform_by(&iso);
        iso
    }

    /// Set every point to the same color, adding colors to the cloud if it had none.
    pub fn paint_uniform(&mut self, color: [u8; 3]) {
        self.colors = Some(vec![color; self.points.len()]);
    }

    /// Replace the points with one point per occupied voxel of edge length `voxel_size`. The new
    /// point is the mean position of the points in the voxel, and its color the mean color.
    ///
    /// # Arguments
    ///
    /// * `voxel_size`: the voxel edge length, which must be finite and greater than zero
    ///
    /// returns: Result<PointCloud, CloudError>
    pub fn voxel_downsample(&self, voxel_size: f64) -> Result<PointCloud> {
        if !voxel_size.is_finite() || voxel_size <= 0.0 {
            return Err(CloudError::invalid(
                "voxel_size",
                format!("must be a positive number, got {voxel_size}"),
            ));
        }

        let groups = voxel_groups(&self.points, voxel_size);
        let mut points = Vec::with_capacity(groups.len());
        let mut colors = self.colors.as_ref().map(|_| Vec::with_capacity(groups.len()));

        for group in groups.iter() {
            let n = group.len() as f64;
            let mut sum = Vector3::zeros();
            for &i in group {
                sum += self.points[i].coords;
            }
            points.push(Point3::from(sum / n));

            if let (Some(out), Some(source)) = (colors.as_mut(), self.colors.as_ref()) {
                let mut c = [0.0; 3];
                for &i in group {
                    for (k, v) in c.iter_mut().enumerate() {
                        *v += source[i][k] as f64;
                    }
                }
                out.push(c.map(|v| (v / n).round().clamp(0.0, 255.0) as u8));
            }
        }

        debug!(
            "voxel downsample ({voxel_size}): {} -> {} points",
            self.points.len(),
            points.len()
        );
        PointCloud::try_new(points, colors)
    }

    /// The sub-cloud containing the given indices, or with `invert`, every point except them.
    /// Points keep their original order in both cases, and repeated indices select a point once.
    ///
    /// # Examples
    ///
    /// ```
    /// use doorguard::{Point3, PointCloud};
    /// use doorguard::geom3::point_cloud::PointCloudFeatures;
    /// let points = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect::<Vec<_>>();
    /// let cloud = PointCloud::from(points.as_slice());
    /// let rest = cloud.select_by_indices(&[3, 1], true).unwrap();
    /// assert_eq!(rest.len(), 3);
    /// assert!(cloud.select_by_indices(&[5], false).is_err());
    /// ```
    pub fn select_by_indices(&self, indices: &[usize], invert: bool) -> Result<PointCloud> {
        let mut mask = IndexMask::try_from_indices(self.points.len(), indices)?;
        if invert {
            mask.flip();
        }
        self.create_from_mask(&mask)
    }

    pub fn axis_aligned_box(&self, color: [u8; 3]) -> Result<AxisAlignedBox> {
        AxisAlignedBox::from_points(&self.points, color)
    }

    pub fn oriented_box(&self, color: [u8; 3]) -> Result<OrientedBox> {
        OrientedBox::from_points(&self.points, color)
    }

    pub fn create_matched_tree(&self) -> MatchedTree {
        let tree = KdTree3::new(&self.points);
        MatchedTree::new(self.tree_uuid, tree)
    }
}

impl From<&[Point3]> for PointCloud {
    fn from(points: &[Point3]) -> Self {
        Self {
            tree_uuid: Uuid::new_v4(),
            points: points.to_vec(),
            colors: None,
        }
    }
}

impl PointCloudFeatures for PointCloud {
    fn points(&self) -> &[Point3] {
        &self.points
    }

    fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }
}

/// A point cloud paired with a neighbor tree that is known to have been built from its current
/// contents. The neighbor-based filters and the clusterer work through this type.
pub struct PointCloudKdTree<'a> {
    cloud: &'a PointCloud,
    tree: &'a MatchedTree,
}

impl<'a> PointCloudKdTree<'a> {
    pub fn try_new(cloud: &'a PointCloud, tree: &'a MatchedTree) -> Result<Self> {
        if cloud.tree_uuid != tree.tree_uuid() {
            return Err(CloudError::InconsistentData {
                reason: "the point cloud and the KD tree do not match".to_string(),
            });
        }
        Ok(Self { cloud, tree })
    }

    pub fn tree(&self) -> &KdTree3 {
        self.tree.tree()
    }
}

impl PointCloudFeatures for PointCloudKdTree<'_> {
    fn points(&self) -> &[Point3] {
        &self.cloud.points
    }

    fn colors(&self) -> Option<&[[u8; 3]]> {
        self.cloud.colors.as_deref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Random points in an axis aligned box, seeded so tests are repeatable.
    pub fn random_box_points(
        rng: &mut StdRng,
        n: usize,
        min: Point3,
        max: Point3,
    ) -> Vec<Point3> {
        (0..n)
            .map(|_| {
                Point3::new(
                    rng.random_range(min.x..=max.x),
                    rng.random_range(min.y..=max.y),
                    rng.random_range(min.z..=max.z),
                )
            })
            .collect()
    }

    fn sample_cloud() -> PointCloud {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_box_points(
            &mut rng,
            2000,
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
        );
        let colors = (0..points.len())
            .map(|i| [(i % 256) as u8, 128, 255 - (i % 256) as u8])
            .collect();
        PointCloud::try_new(points, Some(colors)).unwrap()
    }

    #[test]
    fn downsample_reduces_and_is_idempotent() {
        let cloud = sample_cloud();
        let once = cloud.voxel_downsample(0.25).unwrap();
        let twice = once.voxel_downsample(0.25).unwrap();

        assert!(once.len() <= cloud.len());
        assert!(!once.is_empty());
        assert_eq!(once.points(), twice.points());
        assert_eq!(once.colors(), twice.colors());
    }

    #[test]
    fn downsample_averages_position_and_color() {
        let cloud = PointCloud::try_new(
            vec![
                Point3::new(0.1, 0.1, 0.1),
                Point3::new(0.3, 0.5, 0.7),
                Point3::new(2.5, 0.5, 0.5),
            ],
            Some(vec![[0, 0, 0], [100, 200, 51], [9, 9, 9]]),
        )
        .unwrap();
        let down = cloud.voxel_downsample(1.0).unwrap();

        assert_eq!(down.len(), 2);
        assert_relative_eq!(down.points()[0], Point3::new(0.2, 0.3, 0.4), epsilon = 1e-12);
        assert_eq!(down.colors().unwrap()[0], [50, 100, 26]);
        assert_eq!(down.colors().unwrap()[1], [9, 9, 9]);
    }

    #[test]
    fn downsample_rejects_bad_voxel_size() {
        let cloud = sample_cloud();
        assert!(matches!(
            cloud.voxel_downsample(0.0),
            Err(CloudError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn downsample_single_point() {
        let cloud = PointCloud::from([Point3::new(3.0, 2.0, 1.0)].as_slice());
        assert_eq!(cloud.voxel_downsample(0.5).unwrap().len(), 1);
    }

    #[test]
    fn select_by_indices_preserves_order_and_colors() {
        let cloud = sample_cloud();
        let picked = cloud.select_by_indices(&[10, 2, 5], false).unwrap();
        assert_eq!(picked.points(), &[cloud.points()[2], cloud.points()[5], cloud.points()[10]]);
        assert_eq!(picked.colors().unwrap()[0], cloud.colors().unwrap()[2]);

        let rest = cloud.select_by_indices(&[10, 2, 5], true).unwrap();
        assert_eq!(rest.len(), cloud.len() - 3);
        assert_eq!(rest.points()[2], cloud.points()[3]);
    }

    #[test]
    fn select_out_of_range() {
        let cloud = sample_cloud();
        let result = cloud.select_by_indices(&[0, 2000], true);
        assert_eq!(
            result.unwrap_err(),
            CloudError::IndexOutOfRange {
                index: 2000,
                len: 2000
            }
        );
    }

    #[test]
    fn transform_invalidates_tree() {
        let mut cloud = sample_cloud();
        let tree = cloud.create_matched_tree();
        assert!(PointCloudKdTree::try_new(&cloud, &tree).is_ok());

        cloud.transform(&Rotation3::identity(), &Vector3::new(1.0, 0.0, 0.0));
        assert!(PointCloudKdTree::try_new(&cloud, &tree).is_err());
    }

    #[test]
    fn transform_rotates_then_translates() {
        let mut cloud = PointCloud::from([Point3::new(1.0, 0.0, 0.0)].as_slice());
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        cloud.transform(&rotation, &Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(cloud.points()[0], Point3::new(0.0, 1.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn align_plane_flattens_points() {
        let plane = Plane3::from_coefficients(0.2, -0.5, 0.8, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let points = random_box_points(
            &mut rng,
            50,
            Point3::new(-2.0, -2.0, -2.0),
            Point3::new(2.0, 2.0, 2.0),
        )
        .iter()
        .map(|p| plane.project_point(p))
        .collect::<Vec<_>>();

        let mut cloud = PointCloud::from(points.as_slice());
        cloud.align_plane_with_z(&plane);
        for p in cloud.points() {
            assert_relative_eq!(p.z, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn merge_requires_matching_colors() {
        let mut a = PointCloud::from([Point3::origin()].as_slice());
        let mut b = PointCloud::from([Point3::new(1.0, 1.0, 1.0)].as_slice());
        b.paint_uniform([1, 2, 3]);
        assert!(a.merge(b).is_err());

        let c = PointCloud::from([Point3::new(2.0, 2.0, 2.0)].as_slice());
        a.merge(c).unwrap();
        assert_eq!(a.len(), 2);
    }
}
