mod bounding;
pub mod mesh;
mod plane3;
pub mod point_cloud;

pub use bounding::{AxisAlignedBox, BoxCorners, OrientedBox};
pub use mesh::Mesh;
pub use plane3::Plane3;
pub use point_cloud::{Cluster, PointCloud};

pub type Point3 = parry3d_f64::na::Point3<f64>;
pub type Vector3 = parry3d_f64::na::Vector3<f64>;
pub type UnitVec3 = parry3d_f64::na::Unit<Vector3>;
pub type Iso3 = parry3d_f64::na::Isometry3<f64>;
pub type Aabb = parry3d_f64::bounding_volume::Aabb;
