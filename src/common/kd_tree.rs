//! Neighbor search over 3D points, backed by an immutable `kiddo` k-d tree. The tree stores the
//! index of each point so results can be mapped straight back into the source slice.

use crate::Point3;
use kiddo::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use std::num::NonZero;
use uuid::Uuid;

type InnerTree = ImmutableKdTree<f64, u64, 3, 32>;

/// Queries shared by anything that can answer nearest neighbor questions. Results are pairs of
/// (point index, distance), sorted by increasing distance. Radius queries are inclusive.
pub trait KdTreeSearch {
    fn nearest(&self, point: &Point3, count: NonZero<usize>) -> Vec<(usize, f64)>;

    fn within(&self, point: &Point3, radius: f64) -> Vec<(usize, f64)>;
}

pub struct KdTree3 {
    tree: Option<InnerTree>,
    len: usize,
}

impl KdTree3 {
    /// Build a tree over the points. The tree holds a copy of the coordinates, so the slice may be
    /// dropped afterward. An empty slice produces a tree that answers every query with nothing.
    pub fn new(points: &[Point3]) -> Self {
        let entries = points.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>();
        let tree = if entries.is_empty() {
            None
        } else {
            Some(InnerTree::new_from_slice(&entries))
        };
        Self {
            tree,
            len: points.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl KdTreeSearch for KdTree3 {
    fn nearest(&self, point: &Point3, count: NonZero<usize>) -> Vec<(usize, f64)> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        tree.nearest_n::<SquaredEuclidean>(&[point.x, point.y, point.z], count)
            .into_iter()
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .collect()
    }

    fn within(&self, point: &Point3, radius: f64) -> Vec<(usize, f64)> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        // Points exactly at `radius` are included
        let limit = radius * radius;
        tree.within::<SquaredEuclidean>(&[point.x, point.y, point.z], limit * (1.0 + f64::EPSILON))
            .into_iter()
            .filter(|n| n.distance <= limit)
            .map(|n| (n.item as usize, n.distance.sqrt()))
            .collect()
    }
}

/// A tree tagged with the id of the point cloud contents it was built from. Point clouds change
/// their id whenever their points change, so a stale tree can be detected before it is used.
pub struct MatchedTree {
    tree_uuid: Uuid,
    tree: KdTree3,
}

impl MatchedTree {
    pub fn new(tree_uuid: Uuid, tree: KdTree3) -> Self {
        Self { tree_uuid, tree }
    }

    pub fn tree_uuid(&self) -> Uuid {
        self.tree_uuid
    }

    pub fn tree(&self) -> &KdTree3 {
        &self.tree
    }
}
