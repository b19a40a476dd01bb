//! Point cloud processing for safety-door monitoring. A single time-of-flight capture is
//! downsampled, cleaned of noise, stripped of its ground plane, searched for the door plane, and
//! the remaining points are clustered into objects. Each object is meshed and tested against the
//! door opening.

pub mod common;
pub mod display;
pub mod errors;
pub mod geom3;
pub mod io;
pub mod pipeline;

pub use errors::CloudError;
pub use geom3::{
    AxisAlignedBox, BoxCorners, Cluster, Iso3, Mesh, OrientedBox, Plane3, Point3, PointCloud,
    UnitVec3, Vector3,
};
pub use pipeline::{DoorPipeline, PipelineOutput, PipelineParams};

pub type Result<T> = std::result::Result<T, CloudError>;
