//! Common operations on f64 points and on scalar samples derived from them.

use crate::geom3::{Point3, Vector3};

/// Returns the distance between two points.
///
/// # Examples
///
/// ```
/// use doorguard::common::points::dist;
/// use doorguard::Point3;
/// let a = Point3::new(1.0, 2.0, 0.0);
/// let b = Point3::new(3.0, 2.0, 0.0);
/// assert_eq!(dist(&a, &b), 2.0);
/// ```
pub fn dist(a: &Point3, b: &Point3) -> f64 {
    (a - b).norm()
}

/// Returns the midpoint between two points.
pub fn mid_point(a: &Point3, b: &Point3) -> Point3 {
    b + (a - b) * 0.5
}

/// Returns the mean point of a set of points. The mean is found by summing the coordinates of all
/// points and dividing by the number of points, with no weighting. An empty slice gives the
/// origin.
///
/// # Examples
///
/// ```
/// use doorguard::common::points::mean_point;
/// use doorguard::Point3;
/// let points = vec![Point3::new(1.0, 2.0, 0.0), Point3::new(3.0, 4.0, 2.0)];
/// assert_eq!(mean_point(&points), Point3::new(2.0, 3.0, 1.0));
/// ```
pub fn mean_point(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::origin();
    }
    let mut sum = Vector3::zeros();
    for p in points {
        sum += p.coords;
    }
    Point3::from(sum / points.len() as f64)
}

/// Returns the mean and the sample standard deviation of a set of values, or `None` if the set
/// is empty. A single value has a deviation of zero.
pub fn mean_and_stdev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() == 1 {
        return Some((mean, 0.0));
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}
