//! Density based clustering (DBSCAN) and the per-cluster post-processing used to turn clusters
//! into boxes and meshes.

use super::{PointCloud, PointCloudFeatures, PointCloudKdTree};
use crate::common::kd_tree::KdTreeSearch;
use crate::geom3::mesh::alpha_shape;
use crate::geom3::{AxisAlignedBox, Mesh, OrientedBox};
use crate::{CloudError, Result};
use log::debug;
use rayon::prelude::*;
use std::collections::VecDeque;

/// The label given to points which belong to no cluster.
pub const NOISE: i32 = -1;

/// A group of points found by DBSCAN, copied out of the clustered cloud with their colors.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub label: i32,
    pub cloud: PointCloud,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }
}

impl PointCloudKdTree<'_> {
    /// Label every point with a cluster number, or `NOISE`.
    ///
    /// A point's neighborhood is every point within `eps` of it, itself included. Points with at
    /// least `min_points` neighbors are core points. Clusters are started from unlabeled core
    /// points in ascending index order and grown through the neighborhoods of their core points,
    /// so labels start at 0 and do not depend on thread scheduling. A border point reachable from
    /// more than one cluster keeps the label of the first one to reach it.
    ///
    /// # Arguments
    ///
    /// * `eps`: the neighborhood radius
    /// * `min_points`: the neighborhood size that makes a point a core point
    ///
    /// returns: Result<Vec<i32>, CloudError>
    pub fn dbscan_labels(&self, eps: f64, min_points: usize) -> Result<Vec<i32>> {
        if !eps.is_finite() || eps <= 0.0 {
            return Err(CloudError::invalid(
                "eps",
                format!("must be a positive number, got {eps}"),
            ));
        }
        if min_points == 0 {
            return Err(CloudError::invalid("min_points", "must be at least 1"));
        }

        let neighbors = self
            .points()
            .par_iter()
            .map(|p| {
                let mut found = self
                    .tree()
                    .within(p, eps)
                    .into_iter()
                    .map(|(i, _)| i)
                    .collect::<Vec<_>>();
                found.sort_unstable();
                found
            })
            .collect::<Vec<_>>();
        let core = neighbors
            .iter()
            .map(|n| n.len() >= min_points)
            .collect::<Vec<_>>();

        let mut labels = vec![NOISE; self.len()];
        let mut next_label = 0;
        let mut queue = VecDeque::new();

        for seed in 0..self.len() {
            if labels[seed] != NOISE || !core[seed] {
                continue;
            }
            labels[seed] = next_label;
            queue.push_back(seed);

            while let Some(i) = queue.pop_front() {
                // Border points join the cluster but do not extend it
                if !core[i] {
                    continue;
                }
                for &j in neighbors[i].iter() {
                    if labels[j] == NOISE {
                        labels[j] = next_label;
                        queue.push_back(j);
                    }
                }
            }
            next_label += 1;
        }

        Ok(labels)
    }
}

impl PointCloud {
    /// DBSCAN labels for each point of the cloud, see `PointCloudKdTree::dbscan_labels`.
    pub fn dbscan_labels(&self, eps: f64, min_points: usize) -> Result<Vec<i32>> {
        let tree = self.create_matched_tree();
        PointCloudKdTree::try_new(self, &tree)?.dbscan_labels(eps, min_points)
    }

    /// Split the cloud into its DBSCAN clusters, in ascending label order. Noise points are
    /// dropped, so a cloud that is entirely noise gives no clusters.
    pub fn dbscan_cluster(&self, eps: f64, min_points: usize) -> Result<Vec<Cluster>> {
        let labels = self.dbscan_labels(eps, min_points)?;
        let count = labels.iter().max().map_or(0, |&m| (m + 1).max(0) as usize);

        let mut members = vec![Vec::new(); count];
        for (i, &label) in labels.iter().enumerate() {
            if label != NOISE {
                members[label as usize].push(i);
            }
        }

        let clusters = members
            .iter()
            .enumerate()
            .map(|(label, indices)| {
                Ok(Cluster {
                    label: label as i32,
                    cloud: self.create_from_indices(indices)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "dbscan (eps={eps}, min={min_points}): {} clusters, {} noise points",
            clusters.len(),
            labels.iter().filter(|&&l| l == NOISE).count()
        );
        Ok(clusters)
    }
}

/// Keep only the clusters with more than `min_points` points, in their original order.
pub fn filter_by_point_count(clusters: Vec<Cluster>, min_points: usize) -> Vec<Cluster> {
    clusters
        .into_iter()
        .filter(|c| c.len() > min_points)
        .collect()
}

pub fn cluster_aabbs(clusters: &[Cluster], color: [u8; 3]) -> Result<Vec<AxisAlignedBox>> {
    clusters
        .iter()
        .map(|c| c.cloud.axis_aligned_box(color))
        .collect()
}

pub fn cluster_obbs(clusters: &[Cluster], color: [u8; 3]) -> Result<Vec<OrientedBox>> {
    clusters.iter().map(|c| c.cloud.oriented_box(color)).collect()
}

/// Build an alpha shape for every cluster. Each cluster gets its own result so that one
/// degenerate cluster does not hide the meshes of the others.
pub fn cluster_meshes(clusters: &[Cluster], alpha: f64) -> Vec<Result<Mesh>> {
    clusters
        .par_iter()
        .map(|c| alpha_shape(&c.cloud, alpha))
        .collect()
}
