use super::points::mean_point;
use crate::{Point3, Vector3};
use parry3d_f64::na::{DMatrix, Matrix3, Rotation3};

/// This structure contains the results of using singular value decomposition to determine the
/// basis vectors of a set of points and their singular values (scales). It is used to fit planes
/// to more than three points and to orient bounding boxes along a cluster's principal axes.
#[derive(Debug)]
pub struct SvdBasis3 {
    /// The resultant basis vectors, sorted by their corresponding singular values so that the
    /// first vector is the most significant. These are given as unit vectors.
    pub basis: [Vector3; 3],

    /// The raw singular values associated with each basis vector.
    pub sv: [f64; 3],

    /// The center of the original point set used to compute the basis. The basis vectors
    /// represent vectors relative to this center as their origin.
    pub center: Point3,

    /// The number of points used to compute the basis
    pub n: usize,
}

impl SvdBasis3 {
    /// Compute the basis vectors of a set of points using `nalgebra`'s singular value
    /// decomposition of the mean-centered points. Returns `None` for fewer than three points,
    /// where a full basis cannot be recovered.
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        let center = mean_point(points);
        let mut matrix = DMatrix::zeros(points.len(), 3);
        for (i, p) in points.iter().enumerate() {
            let v = p - center;
            for j in 0..3 {
                matrix[(i, j)] = v[j];
            }
        }

        let result = matrix.svd(false, true);
        let v_t = result.v_t?;

        let mut basis = [Vector3::zeros(); 3];
        let mut sv = [0.0; 3];
        for i in 0..3 {
            for j in 0..3 {
                basis[i][j] = v_t[(i, j)];
            }
            sv[i] = result.singular_values[i];
        }

        Some(Self {
            basis,
            sv,
            center,
            n: points.len(),
        })
    }

    /// The basis vector with the smallest singular value, which is the normal of the best fit
    /// plane through the points.
    pub fn smallest(&self) -> Vector3 {
        self.basis[2]
    }

    /// The number of singular values larger than `tol`. A rank of 2 means the points lie
    /// essentially in a plane, a rank of 1 on a line.
    pub fn rank(&self, tol: f64) -> usize {
        self.sv.iter().filter(|s| **s > tol).count()
    }

    /// A proper rotation whose columns are the basis vectors. The third axis is flipped if needed
    /// so the frame is right-handed.
    pub fn rotation(&self) -> Rotation3<f64> {
        let x = self.basis[0];
        let y = self.basis[1];
        let z = if x.cross(&y).dot(&self.basis[2]) < 0.0 {
            -self.basis[2]
        } else {
            self.basis[2]
        };
        Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]))
    }
}
