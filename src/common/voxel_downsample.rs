//! This module provides functionality for voxel downsampling of points

use crate::Point3;
use parry3d_f64::utils::hashmap::HashMap;

/// The integer grid cell containing a point for a given voxel edge length.
pub fn voxel_key(point: &Point3, voxel_size: f64) -> [i64; 3] {
    [
        (point.x / voxel_size).floor() as i64,
        (point.y / voxel_size).floor() as i64,
        (point.z / voxel_size).floor() as i64,
    ]
}

/// Bucket the points into cubic voxels of edge length `voxel_size` anchored at the origin. Each
/// entry of the result holds the indices of the points which fell into one occupied voxel. The
/// voxels are ordered by the first point that landed in them, and the indices inside each voxel
/// are in ascending order.
pub fn voxel_groups(points: &[Point3], voxel_size: f64) -> Vec<Vec<usize>> {
    let mut voxel_map: HashMap<[i64; 3], usize> = HashMap::default();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (i, p) in points.iter().enumerate() {
        let key = voxel_key(p, voxel_size);
        match voxel_map.get(&key) {
            Some(&g) => groups[g].push(i),
            None => {
                voxel_map.insert(key, groups.len());
                groups.push(vec![i]);
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_grid() {
        let mut points = Vec::new();
        let s0 = 0.01;

        for i in 0..100 {
            for j in 0..100 {
                points.push(Point3::new(
                    i as f64 * s0 + s0 / 2.0,
                    j as f64 * s0 + s0 / 2.0,
                    0.5,
                ));
            }
        }

        let groups = voxel_groups(&points, 0.1);
        assert_eq!(groups.len(), 100);
        assert!(groups.iter().all(|g| g.len() == 100));
    }

    #[test]
    fn groups_ordered_by_first_point() {
        let points = vec![
            Point3::new(5.5, 0.0, 0.0),
            Point3::new(0.5, 0.0, 0.0),
            Point3::new(5.6, 0.0, 0.0),
        ];
        let groups = voxel_groups(&points, 1.0);
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn negative_coordinates_floor() {
        assert_eq!(voxel_key(&Point3::new(-0.1, 0.1, -1.0), 1.0), [-1, 0, -1]);
    }
}
