//! Building blocks shared by the point cloud and mesh code: index masks, the neighbor search tree,
//! point statistics, principal axes, and voxel bucketing.

mod index_mask;
pub mod kd_tree;
pub mod points;
mod svd_basis;
pub mod voxel_downsample;

pub use index_mask::IndexMask;
pub use svd_basis::SvdBasis3;
