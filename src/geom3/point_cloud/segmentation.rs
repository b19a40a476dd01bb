//! RANSAC plane segmentation.

use super::{PointCloud, PointCloudFeatures};
use crate::{CloudError, Plane3, Point3, Result};
use log::debug;
use rand::Rng;
use rand::seq::index::sample;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Settings for one RANSAC plane search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum perpendicular distance from the plane for a point to count as an inlier
    pub distance_threshold: f64,

    /// Number of points drawn per trial; three gives the exact plane through them, more gives a
    /// least-squares fit
    pub ransac_n: usize,

    /// Number of trials
    pub iterations: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            distance_threshold: 0.04,
            ransac_n: 3,
            iterations: 1000,
        }
    }
}

impl RansacParams {
    pub fn new(distance_threshold: f64, ransac_n: usize, iterations: usize) -> Self {
        Self {
            distance_threshold,
            ransac_n,
            iterations,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(CloudError::invalid(
                "distance_threshold",
                format!("must be zero or positive, got {}", self.distance_threshold),
            ));
        }
        if self.ransac_n < 3 {
            return Err(CloudError::invalid(
                "ransac_n",
                format!("a plane needs at least 3 points, got {}", self.ransac_n),
            ));
        }
        if self.iterations == 0 {
            return Err(CloudError::invalid("iterations", "must be at least 1"));
        }
        Ok(())
    }
}

/// A fitted plane and the ascending indices of the points within the distance threshold of it.
#[derive(Debug, Clone)]
pub struct PlaneSegmentation {
    pub plane: Plane3,
    pub inliers: Vec<usize>,
}

/// The best trial seen so far: inlier count, then the trial number used to break ties in favor
/// of the earliest trial.
#[derive(Clone, Copy)]
struct Trial {
    count: usize,
    index: usize,
    plane: Plane3,
}

fn better(a: Trial, b: Trial) -> Trial {
    if b.count > a.count || (b.count == a.count && b.index < a.index) {
        b
    } else {
        a
    }
}

fn count_inliers(points: &[Point3], plane: &Plane3, threshold: f64) -> usize {
    points
        .iter()
        .filter(|p| plane.distance_to_point(p) <= threshold)
        .count()
}

impl PointCloud {
    /// Find the plane supported by the most points using RANSAC.
    ///
    /// The samples for every trial are drawn up front from `rng`, one after another, so a seeded
    /// generator always produces the same trials. The trials are then scored in parallel. The
    /// plane with the most inliers wins, and among equal counts the earliest trial wins, so the
    /// result does not depend on how the scoring was scheduled. Trials whose points are collinear
    /// are skipped.
    ///
    /// # Arguments
    ///
    /// * `params`: distance threshold, sample size, and number of trials
    /// * `rng`: the random source for sampling
    ///
    /// returns: Result<PlaneSegmentation, CloudError>
    pub fn segment_plane<R: Rng + ?Sized>(
        &self,
        params: &RansacParams,
        rng: &mut R,
    ) -> Result<PlaneSegmentation> {
        params.validate()?;
        if self.len() < params.ransac_n {
            return Err(CloudError::InsufficientPoints {
                stage: "plane segmentation",
                required: params.ransac_n,
                actual: self.len(),
            });
        }

        let samples = (0..params.iterations)
            .map(|_| sample(rng, self.len(), params.ransac_n).into_vec())
            .collect::<Vec<_>>();

        let points = self.points();
        let best = samples
            .par_iter()
            .enumerate()
            .filter_map(|(index, sample)| {
                let chosen = sample.iter().map(|&i| points[i]).collect::<Vec<_>>();
                let plane = Plane3::fit_points(&chosen)?;
                let count = count_inliers(points, &plane, params.distance_threshold);
                Some(Trial {
                    count,
                    index,
                    plane,
                })
            })
            .reduce_with(better)
            .ok_or(CloudError::PlaneNotFound {
                iterations: params.iterations,
            })?;

        let inliers = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                (best.plane.distance_to_point(p) <= params.distance_threshold).then_some(i)
            })
            .collect::<Vec<_>>();

        debug!(
            "plane {:?} from trial {} has {} of {} points as inliers",
            best.plane.coefficients(),
            best.index,
            inliers.len(),
            self.len()
        );

        Ok(PlaneSegmentation {
            plane: best.plane,
            inliers,
        })
    }

    /// Segment the dominant plane and return it along with every point that is not part of it.
    pub fn remove_plane<R: Rng + ?Sized>(
        &self,
        params: &RansacParams,
        rng: &mut R,
    ) -> Result<(PlaneSegmentation, PointCloud)> {
        let segmentation = self.segment_plane(params, rng)?;
        let rest = self.select_by_indices(&segmentation.inliers, true)?;
        Ok((segmentation, rest))
    }

    /// Segment the dominant plane and return it along with its inlier points.
    pub fn extract_plane<R: Rng + ?Sized>(
        &self,
        params: &RansacParams,
        rng: &mut R,
    ) -> Result<(PlaneSegmentation, PointCloud)> {
        let segmentation = self.segment_plane(params, rng)?;
        let plane_points = self.select_by_indices(&segmentation.inliers, false)?;
        Ok((segmentation, plane_points))
    }
}
