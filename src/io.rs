//! Reading and writing point clouds and meshes.

mod point_cloud;
#[cfg(feature = "stl")]
mod stl;

pub use point_cloud::{PcdEncoding, parse_pcd, read_pcd, write_pcd};
#[cfg(feature = "stl")]
pub use stl::write_stl;
