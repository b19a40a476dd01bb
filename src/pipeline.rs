//! The door detection pipeline: clean up a captured cloud, remove the ground, find the door, and
//! check every remaining object against the door's bounding volume.

use crate::display::{Drawable, Geometry, to_drawables};
use crate::geom3::mesh::{convex_hull_from_box, intersects_portal};
use crate::geom3::point_cloud::{
    Cluster, PointCloudFeatures, RansacParams, cluster_meshes, filter_by_point_count,
};
use crate::{AxisAlignedBox, CloudError, Mesh, Plane3, PointCloud, Result};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DOOR_COLOR: [u8; 3] = [0, 255, 0];
pub const OBJECT_COLOR: [u8; 3] = [255, 0, 0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalParams {
    pub neighbors: usize,
    pub std_ratio: f64,
}

impl Default for StatisticalParams {
    fn default() -> Self {
        Self {
            neighbors: 20,
            std_ratio: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiusParams {
    pub min_points: usize,
    pub radius: f64,
}

impl Default for RadiusParams {
    fn default() -> Self {
        Self {
            min_points: 15,
            radius: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    pub eps: f64,
    pub min_points: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            eps: 0.1,
            min_points: 10,
        }
    }
}

/// Every setting of a pipeline run. Missing keys in a JSON file keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub voxel_size: f64,
    pub statistical: StatisticalParams,
    pub radius: RadiusParams,
    pub ground: RansacParams,
    pub door: RansacParams,
    pub clustering: ClusteringParams,

    /// Clusters with this many points or fewer are dropped
    pub min_cluster_points: usize,

    /// The alpha shape radius used to mesh each cluster
    pub alpha: f64,

    /// Opacity of meshes and boxes in the display output, 0 to 1
    pub mesh_opacity: f64,

    /// Seed for the RANSAC sampling
    pub seed: u64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            voxel_size: 0.03,
            statistical: StatisticalParams::default(),
            radius: RadiusParams::default(),
            ground: RansacParams::default(),
            door: RansacParams::new(0.02, 3, 1000),
            clustering: ClusteringParams::default(),
            min_cluster_points: 80,
            alpha: 0.2,
            mesh_opacity: 0.2,
            seed: 0,
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CloudError::invalid(
            name,
            format!("must be a positive number, got {value}"),
        ))
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        Err(CloudError::invalid(name, "must be at least 1"))
    } else {
        Ok(())
    }
}

impl PipelineParams {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| CloudError::invalid("parameters", format!("bad parameter JSON: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CloudError::invalid("parameters", format!("{}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Check every setting against its allowed range.
    pub fn validate(&self) -> Result<()> {
        positive("voxel_size", self.voxel_size)?;
        at_least_one("statistical.neighbors", self.statistical.neighbors)?;
        positive("statistical.std_ratio", self.statistical.std_ratio)?;
        at_least_one("radius.min_points", self.radius.min_points)?;
        positive("radius.radius", self.radius.radius)?;
        self.ground.validate()?;
        self.door.validate()?;
        positive("clustering.eps", self.clustering.eps)?;
        at_least_one("clustering.min_points", self.clustering.min_points)?;
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(CloudError::invalid(
                "alpha",
                format!("must be zero or positive, got {}", self.alpha),
            ));
        }
        if !(0.0..=1.0).contains(&self.mesh_opacity) {
            return Err(CloudError::invalid(
                "mesh_opacity",
                format!("must be between 0 and 1, got {}", self.mesh_opacity),
            ));
        }
        Ok(())
    }
}

/// A cluster left after the ground and door were removed, and what was found out about it.
#[derive(Debug, Clone)]
pub struct DetectedObject {
    pub cluster: Cluster,
    pub aabb: AxisAlignedBox,

    /// The alpha shape of the cluster, or `None` if it was degenerate
    pub mesh: Option<Mesh>,
    pub intersects_door: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The input cloud, untouched
    pub original: PointCloud,

    /// The cleaned cloud with the ground and door points removed
    pub processed: PointCloud,
    pub ground_plane: Plane3,
    pub door_plane: Plane3,
    pub door_cloud: PointCloud,
    pub door_box: AxisAlignedBox,

    /// The hull of the door's box, or `None` if the box is flat
    pub door_mesh: Option<Mesh>,
    pub objects: Vec<DetectedObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub label: i32,
    pub points: usize,
    pub aabb: AxisAlignedBox,
    pub has_mesh: bool,
    pub intersects_door: bool,
}

/// The parts of a run that are worth reporting, in a serializable form.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub input_points: usize,
    pub processed_points: usize,
    pub ground_plane: [f64; 4],
    pub door_plane: [f64; 4],
    pub door_points: usize,
    pub door_box: AxisAlignedBox,
    pub has_door_mesh: bool,
    pub objects: Vec<ObjectSummary>,
}

impl PipelineOutput {
    pub fn any_intersection(&self) -> bool {
        self.objects.iter().any(|o| o.intersects_door)
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            input_points: self.original.len(),
            processed_points: self.processed.len(),
            ground_plane: self.ground_plane.coefficients(),
            door_plane: self.door_plane.coefficients(),
            door_points: self.door_cloud.len(),
            door_box: self.door_box,
            has_door_mesh: self.door_mesh.is_some(),
            objects: self
                .objects
                .iter()
                .map(|o| ObjectSummary {
                    label: o.cluster.label,
                    points: o.cluster.len(),
                    aabb: o.aabb,
                    has_mesh: o.mesh.is_some(),
                    intersects_door: o.intersects_door,
                })
                .collect(),
        }
    }

    /// The processed view: the remaining points, the door's hull if it has one, and each
    /// object's mesh, or its bounding box when it has no mesh.
    pub fn drawables(&self, mesh_opacity: f64) -> Result<Vec<Drawable>> {
        let mut geometry = vec![Geometry::Cloud(&self.processed)];
        if let Some(door) = &self.door_mesh {
            geometry.push(Geometry::Mesh(door));
        }
        for o in self.objects.iter() {
            geometry.push(match &o.mesh {
                Some(m) => Geometry::Mesh(m),
                None => Geometry::AxisBox(&o.aabb),
            });
        }
        to_drawables(&geometry, mesh_opacity)
    }

    /// The source view: the input points as they were loaded.
    pub fn source_drawables(&self) -> Result<Vec<Drawable>> {
        to_drawables(&[Geometry::Cloud(&self.original)], 1.0)
    }
}

/// Runs the stages in order: voxel downsampling, statistical and radius filtering, ground
/// removal, door extraction, clustering, cluster meshing, and the door intersection test.
pub struct DoorPipeline {
    params: PipelineParams,
}

impl DoorPipeline {
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Run every stage on `cloud`. The first stage to fail ends the run with its error, except
    /// for a degenerate mesh. A cluster whose alpha shape is degenerate is kept without a mesh
    /// and cannot intersect the door. A flat door box has no hull, and then nothing intersects
    /// the door.
    pub fn run(&self, cloud: &PointCloud) -> Result<PipelineOutput> {
        let p = &self.params;
        let mut rng = StdRng::seed_from_u64(p.seed);
        info!("pipeline started with {} points", cloud.len());

        let down = cloud.voxel_downsample(p.voxel_size)?;
        let stat = down.statistical_outliers(p.statistical.neighbors, p.statistical.std_ratio)?;
        let filtered = stat
            .cloud
            .radius_outliers(p.radius.min_points, p.radius.radius)?
            .cloud;
        info!(
            "{} points after downsampling, {} after statistical filter, {} after radius filter",
            down.len(),
            stat.cloud.len(),
            filtered.len()
        );

        let (ground, without_ground) = filtered.remove_plane(&p.ground, &mut rng)?;
        info!(
            "ground plane {:?} removed {} points",
            ground.plane.coefficients(),
            ground.inliers.len()
        );

        let (door, door_cloud) = without_ground.extract_plane(&p.door, &mut rng)?;
        let processed = without_ground.select_by_indices(&door.inliers, true)?;
        let door_box = door_cloud.axis_aligned_box(DOOR_COLOR)?;
        let door_mesh = match convex_hull_from_box(&door_box) {
            Ok(m) => Some(m),
            Err(CloudError::DegenerateMesh { reason }) => {
                warn!("door has no hull: {reason}");
                None
            }
            Err(e) => return Err(e),
        };
        info!(
            "door plane {:?} has {} points, {} points remain",
            door.plane.coefficients(),
            door_cloud.len(),
            processed.len()
        );

        let clusters = processed.dbscan_cluster(p.clustering.eps, p.clustering.min_points)?;
        let found = clusters.len();
        let clusters = filter_by_point_count(clusters, p.min_cluster_points);
        info!(
            "{found} clusters found, {} with more than {} points",
            clusters.len(),
            p.min_cluster_points
        );

        let meshes = cluster_meshes(&clusters, p.alpha);
        let objects = clusters
            .into_iter()
            .zip(meshes)
            .map(|(cluster, mesh)| {
                let aabb = cluster.cloud.axis_aligned_box(OBJECT_COLOR)?;
                let mesh = match mesh {
                    Ok(m) => Some(m),
                    Err(CloudError::DegenerateMesh { reason }) => {
                        warn!("cluster {} has no mesh: {reason}", cluster.label);
                        None
                    }
                    Err(e) => return Err(e),
                };
                let intersects_door = door_mesh
                    .as_ref()
                    .is_some_and(|door| intersects_portal(mesh.as_ref(), door));
                Ok(DetectedObject {
                    cluster,
                    aabb,
                    mesh,
                    intersects_door,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "{} of {} objects intersect the door",
            objects.iter().filter(|o| o.intersects_door).count(),
            objects.len()
        );

        Ok(PipelineOutput {
            original: cloud.clone(),
            processed,
            ground_plane: ground.plane,
            door_plane: door.plane,
            door_cloud,
            door_box,
            door_mesh,
            objects,
        })
    }
}
