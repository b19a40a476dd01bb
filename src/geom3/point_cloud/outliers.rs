//! Neighbor-based noise removal.
//!
//! The statistical filter looks at the mean distance from each point to its `k` nearest
//! neighbors, computes the mean and sample standard deviation of that value over the whole cloud,
//! and keeps the points whose mean distance is no more than `mean + std_ratio * stdev`. A point
//! is its own nearest neighbor, at distance zero, and counts as one of the `k`. The radius filter
//! counts the points within `radius`, the point itself included, and keeps the points whose count
//! is above `min_points`, so each survivor has at least `min_points` others nearby.

use super::{PointCloud, PointCloudFeatures, PointCloudKdTree};
use crate::common::IndexMask;
use crate::common::kd_tree::KdTreeSearch;
use crate::common::points::mean_and_stdev;
use crate::{CloudError, Result};
use log::debug;
use rayon::prelude::*;
use std::num::NonZero;

/// The output of a filter: the surviving points and their indices in the filter's input cloud,
/// in ascending order.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub cloud: PointCloud,
    pub inliers: Vec<usize>,
}

impl FilterResult {
    fn from_mask(source: &PointCloud, mask: &IndexMask) -> Result<Self> {
        Ok(Self {
            cloud: source.create_from_mask(mask)?,
            inliers: mask.to_indices(),
        })
    }

    pub fn removed(&self, original_count: usize) -> usize {
        original_count - self.inliers.len()
    }
}

impl PointCloudKdTree<'_> {
    /// Mask of the points which pass the statistical filter. See the module documentation.
    ///
    /// # Arguments
    ///
    /// * `k`: the number of neighbors, the point itself included, to average over
    /// * `std_ratio`: how many standard deviations above the mean a point may sit
    ///
    /// returns: Result<IndexMask, CloudError>
    pub fn statistical_mask(&self, k: usize, std_ratio: f64) -> Result<IndexMask> {
        let k = NonZero::new(k).ok_or_else(|| CloudError::invalid("k", "must be at least 1"))?;
        if std_ratio.is_nan() || std_ratio <= 0.0 {
            return Err(CloudError::invalid(
                "std_ratio",
                format!("must be greater than zero, got {std_ratio}"),
            ));
        }
        if self.is_empty() {
            return Ok(IndexMask::new(0, false));
        }

        let mean_distances = self
            .points()
            .par_iter()
            .map(|p| {
                let found = self.tree().nearest(p, k);
                let sum = found.iter().map(|(_, d)| d).sum::<f64>();
                if found.is_empty() { 0.0 } else { sum / found.len() as f64 }
            })
            .collect::<Vec<_>>();

        let (mean, stdev) = mean_and_stdev(&mean_distances).unwrap_or((0.0, 0.0));
        let threshold = mean + std_ratio * stdev;

        Ok(IndexMask::from(
            mean_distances
                .iter()
                .map(|d| *d <= threshold)
                .collect::<Vec<_>>(),
        ))
    }

    /// Mask of the points which have more than `min_points` points within `radius`, counting
    /// themselves.
    pub fn radius_mask(&self, min_points: usize, radius: f64) -> Result<IndexMask> {
        if min_points == 0 {
            return Err(CloudError::invalid("min_points", "must be at least 1"));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(CloudError::invalid(
                "radius",
                format!("must be a positive number, got {radius}"),
            ));
        }

        let keep = self
            .points()
            .par_iter()
            .map(|p| self.tree().within(p, radius).len() > min_points)
            .collect::<Vec<_>>();

        Ok(IndexMask::from(keep))
    }
}

impl PointCloud {
    /// Remove points whose mean distance to their `k` nearest neighbors is more than `std_ratio`
    /// standard deviations above the cloud's average. An empty cloud gives an empty result.
    pub fn statistical_outliers(&self, k: usize, std_ratio: f64) -> Result<FilterResult> {
        let tree = self.create_matched_tree();
        let indexed = PointCloudKdTree::try_new(self, &tree)?;
        let mask = indexed.statistical_mask(k, std_ratio)?;
        let result = FilterResult::from_mask(self, &mask)?;
        debug!(
            "statistical filter (k={k}, ratio={std_ratio}): removed {} of {} points",
            result.removed(self.len()),
            self.len()
        );
        Ok(result)
    }

    /// Remove points which have fewer than `min_points` other points within `radius`. An empty
    /// cloud gives an empty result.
    pub fn radius_outliers(&self, min_points: usize, radius: f64) -> Result<FilterResult> {
        let tree = self.create_matched_tree();
        let indexed = PointCloudKdTree::try_new(self, &tree)?;
        let mask = indexed.radius_mask(min_points, radius)?;
        let result = FilterResult::from_mask(self, &mask)?;
        debug!(
            "radius filter (n={min_points}, r={radius}): removed {} of {} points",
            result.removed(self.len()),
            self.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point3;
    use crate::common::points::dist;
    use crate::geom3::point_cloud::tests::random_box_points;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use test_case::test_case;

    fn noisy_cloud() -> PointCloud {
        let mut rng = StdRng::seed_from_u64(11);
        let mut points = random_box_points(
            &mut rng,
            500,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.1),
        );
        points.push(Point3::new(5.0, 5.0, 5.0));
        points.push(Point3::new(-4.0, 0.5, 3.0));
        points.push(Point3::new(0.5, 8.0, -2.0));
        PointCloud::from(points.as_slice())
    }

    #[test]
    fn statistical_removes_far_points() {
        let cloud = noisy_cloud();
        let result = cloud.statistical_outliers(10, 1.0).unwrap();

        assert!(result.cloud.len() < cloud.len());
        assert_eq!(result.cloud.len(), result.inliers.len());
        for far in [500, 501, 502] {
            assert!(!result.inliers.contains(&far));
        }
        assert!(result.inliers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn statistical_counts_self_and_uses_sample_deviation() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut points = random_box_points(
            &mut rng,
            40,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        );
        points.push(Point3::new(1.6, 0.5, 0.5));
        let cloud = PointCloud::from(points.as_slice());
        let k = 4;
        let ratio = 1.0;

        let means = points
            .iter()
            .map(|p| {
                let mut d = points.iter().map(|q| dist(p, q)).collect::<Vec<_>>();
                d.sort_by(f64::total_cmp);
                d[..k].iter().sum::<f64>() / k as f64
            })
            .collect::<Vec<_>>();
        let n = means.len() as f64;
        let mean = means.iter().sum::<f64>() / n;
        let stdev = (means.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        let expected = means
            .iter()
            .enumerate()
            .filter(|(_, m)| **m <= mean + ratio * stdev)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        let result = cloud.statistical_outliers(k, ratio).unwrap();
        assert_eq!(result.inliers, expected);
        assert!(!result.inliers.contains(&40));
    }

    #[test]
    fn radius_survivors_have_enough_neighbors() {
        let cloud = noisy_cloud();
        let min_points = 4;
        let radius = 0.1;
        let result = cloud.radius_outliers(min_points, radius).unwrap();

        // Each point counts itself, so survivors have `min_points` others nearby
        let expected = cloud
            .points()
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let count = cloud.points().iter().filter(|q| dist(p, q) <= radius).count();
                count > min_points
            })
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(result.inliers, expected);
        assert_eq!(result.cloud.len(), expected.len());
        assert!(!result.inliers.contains(&500));
    }

    #[test_case(0; "empty")]
    #[test_case(1; "single")]
    fn tiny_clouds_do_not_fail(n: usize) {
        let points = (0..n)
            .map(|i| Point3::new(i as f64, 0.0, 0.0))
            .collect::<Vec<_>>();
        let cloud = PointCloud::from(points.as_slice());

        let stat = cloud.statistical_outliers(20, 2.0).unwrap();
        assert_eq!(stat.cloud.len(), n);

        let radius = cloud.radius_outliers(3, 0.5).unwrap();
        assert!(radius.cloud.is_empty());
    }

    #[test]
    fn invalid_parameters() {
        let cloud = noisy_cloud();
        assert!(cloud.statistical_outliers(0, 1.0).is_err());
        assert!(cloud.statistical_outliers(5, 0.0).is_err());
        assert!(cloud.radius_outliers(0, 1.0).is_err());
        assert!(cloud.radius_outliers(2, -1.0).is_err());
    }
}
