use doorguard::geom3::point_cloud::{PointCloudFeatures, RansacParams};
use doorguard::io::{PcdEncoding, read_pcd, write_pcd};
use doorguard::pipeline::{ClusteringParams, RadiusParams, StatisticalParams};
use doorguard::{CloudError, DoorPipeline, PipelineParams, Point3, PointCloud};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

const JITTER: f64 = 0.001;

fn jitter(rng: &mut StdRng) -> f64 {
    rng.random_range(-JITTER..=JITTER)
}

/// 1000 ground points on a 40 x 25 grid at z = 0 and 200 door points on a 20 x 10 grid at x = 1,
/// both with 0.05 spacing, followed by the given object points.
fn scene(rng: &mut StdRng, object: Vec<Point3>) -> PointCloud {
    scene_with_door(rng, object, true)
}

fn scene_with_door(rng: &mut StdRng, object: Vec<Point3>, door_jitter: bool) -> PointCloud {
    let mut points = Vec::new();
    for i in 0..40 {
        for j in 0..25 {
            points.push(Point3::new(i as f64 * 0.05, j as f64 * 0.05, jitter(rng)));
        }
    }
    for j in 0..20 {
        for k in 0..10 {
            let dx = if door_jitter { jitter(rng) } else { 0.0 };
            points.push(Point3::new(
                1.0 + dx,
                j as f64 * 0.05,
                0.1 + k as f64 * 0.05,
            ));
        }
    }
    points.extend(object);
    PointCloud::from(points.as_slice())
}

/// A lattice with 0.01 spacing whose first corner is at `origin`.
fn lattice(rng: &mut StdRng, origin: Point3, counts: [usize; 3]) -> Vec<Point3> {
    let mut points = Vec::new();
    for i in 0..counts[0] {
        for j in 0..counts[1] {
            for k in 0..counts[2] {
                points.push(Point3::new(
                    origin.x + i as f64 * 0.01 + jitter(rng),
                    origin.y + j as f64 * 0.01 + jitter(rng),
                    origin.z + k as f64 * 0.01 + jitter(rng),
                ));
            }
        }
    }
    points
}

fn params() -> PipelineParams {
    PipelineParams {
        voxel_size: 0.002,
        // Loose enough to keep the corners of the ground and door grids
        statistical: StatisticalParams {
            neighbors: 8,
            std_ratio: 10.0,
        },
        radius: RadiusParams {
            min_points: 3,
            radius: 0.1,
        },
        ground: RansacParams::new(0.01, 3, 1000),
        door: RansacParams::new(0.01, 3, 1000),
        clustering: ClusteringParams {
            eps: 0.1,
            min_points: 5,
        },
        min_cluster_points: 10,
        ..PipelineParams::default()
    }
}

fn blob_beside_door() -> PointCloud {
    let mut rng = StdRng::seed_from_u64(100);
    let blob = lattice(&mut rng, Point3::new(0.5, 0.5, 0.5), [5, 5, 2]);
    scene(&mut rng, blob)
}

/// The blob spans x = 0.96 to 1.04, straight through the door.
fn blob_through_door() -> PointCloud {
    let mut rng = StdRng::seed_from_u64(200);
    let blob = (0..5)
        .flat_map(|i| {
            let x = 0.96 + i as f64 * 0.02;
            (0..5)
                .flat_map(move |j| (0..2).map(move |k| (x, j, k)))
                .collect::<Vec<_>>()
        })
        .map(|(x, j, k)| {
            Point3::new(
                x + jitter(&mut rng),
                0.45 + j as f64 * 0.01 + jitter(&mut rng),
                0.30 + k as f64 * 0.01 + jitter(&mut rng),
            )
        })
        .collect::<Vec<_>>();
    scene(&mut rng, blob)
}

/// A door with no thickness at all, and a blob spanning x = 0.96 to 1.04 that leaves a gap
/// around the door plane.
fn blob_across_flat_door() -> PointCloud {
    let mut rng = StdRng::seed_from_u64(300);
    let mut blob = Vec::new();
    for x in [0.96, 0.98, 1.02, 1.04] {
        for j in 0..5 {
            for k in 0..2 {
                blob.push(Point3::new(
                    x,
                    0.45 + j as f64 * 0.01 + jitter(&mut rng),
                    0.30 + k as f64 * 0.01 + jitter(&mut rng),
                ));
            }
        }
    }
    scene_with_door(&mut rng, blob, false)
}

#[test]
fn blob_beside_door_is_found_and_clear() {
    let cloud = blob_beside_door();
    assert_eq!(cloud.len(), 1250);

    let output = DoorPipeline::new(params()).unwrap().run(&cloud).unwrap();

    assert_eq!(output.objects.len(), 1);
    let object = &output.objects[0];
    assert_eq!(object.cluster.len(), 50);
    assert!(object.aabb.contains(&Point3::new(0.52, 0.52, 0.505)));
    assert!(object.mesh.is_some());
    assert!(!object.intersects_door);
    assert!(!output.any_intersection());

    // The door was found as the vertical plane at x = 1
    let [a, _, _, d] = output.door_plane.coefficients();
    assert!(a.abs() > 0.999);
    assert!((d.abs() - 1.0).abs() < 0.01);
    assert_eq!(output.door_cloud.len(), 200);
    assert!(output.door_box.min.x > 0.99 && output.door_box.max.x < 1.01);

    let [_, _, c, _] = output.ground_plane.coefficients();
    assert!(c.abs() > 0.999);
    assert_eq!(output.original.len(), cloud.len());
}

#[test]
fn blob_through_door_intersects() {
    let cloud = blob_through_door();
    let output = DoorPipeline::new(params()).unwrap().run(&cloud).unwrap();

    // The blob's middle layer lies in the door plane and goes with the door
    assert_eq!(output.objects.len(), 1);
    assert_eq!(output.objects[0].cluster.len(), 40);
    assert!(output.objects[0].mesh.is_some());
    assert!(output.objects[0].intersects_door);
    assert!(output.any_intersection());
}

#[test]
fn flat_door_has_no_hull_and_nothing_intersects() {
    let cloud = blob_across_flat_door();
    let output = DoorPipeline::new(params()).unwrap().run(&cloud).unwrap();

    assert_eq!(output.door_cloud.len(), 200);
    assert_eq!(output.door_box.min.x, output.door_box.max.x);
    assert!(output.door_mesh.is_none());
    assert!(!output.summary().has_door_mesh);

    assert_eq!(output.objects.len(), 1);
    assert_eq!(output.objects[0].cluster.len(), 40);
    assert!(!output.objects[0].intersects_door);
    assert!(!output.any_intersection());

    // Remaining points and the object, with no door
    let drawables = output.drawables(0.2).unwrap();
    assert_eq!(drawables.len(), 2);
    assert_eq!(drawables[0].positions.len(), output.processed.len());
}

#[test]
fn tiny_alpha_leaves_object_without_mesh() {
    let mut tiny = params();
    tiny.alpha = 1e-4;
    let output = DoorPipeline::new(tiny)
        .unwrap()
        .run(&blob_beside_door())
        .unwrap();

    assert!(output.door_mesh.is_some());
    assert_eq!(output.objects.len(), 1);
    assert!(output.objects[0].mesh.is_none());
    assert!(!output.objects[0].intersects_door);
    assert!(!output.summary().objects[0].has_mesh);

    // The object is drawn as its bounding box
    let drawables = output.drawables(0.2).unwrap();
    assert_eq!(drawables.len(), 3);
}

#[test]
fn runs_repeat_exactly() {
    let cloud = blob_through_door();
    let pipeline = DoorPipeline::new(params()).unwrap();
    let first = serde_json::to_string(&pipeline.run(&cloud).unwrap().summary()).unwrap();
    let second = serde_json::to_string(&pipeline.run(&cloud).unwrap().summary()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn small_clusters_are_dropped() {
    let cloud = blob_beside_door();
    let mut strict = params();
    strict.min_cluster_points = 50;
    let output = DoorPipeline::new(strict).unwrap().run(&cloud).unwrap();
    assert!(output.objects.is_empty());
}

#[test]
fn drawables_cover_every_part() {
    let output = DoorPipeline::new(params())
        .unwrap()
        .run(&blob_beside_door())
        .unwrap();
    let drawables = output.drawables(0.2).unwrap();

    // Remaining points, the door, and one object
    assert_eq!(drawables.len(), 3);
    assert_eq!(drawables[0].positions.len(), output.processed.len());
    assert_eq!(drawables[1].triangles.as_ref().map(|t| t.len()), Some(12));

    let source = output.source_drawables().unwrap();
    assert_eq!(source[0].positions.len(), 1250);
}

#[test]
fn pcd_file_gives_same_result() {
    let cloud = blob_beside_door();
    let path = std::env::temp_dir().join(format!("{}.pcd", Uuid::new_v4()));
    write_pcd(&path, &cloud, PcdEncoding::Binary).unwrap();
    let loaded = read_pcd(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let pipeline = DoorPipeline::new(params()).unwrap();
    let direct = serde_json::to_string(&pipeline.run(&cloud).unwrap().summary()).unwrap();
    let from_file = serde_json::to_string(&pipeline.run(&loaded).unwrap().summary()).unwrap();
    assert_eq!(direct, from_file);
}

#[test]
fn too_little_data_is_reported() {
    let cloud = PointCloud::from([Point3::origin(), Point3::new(5.0, 5.0, 5.0)].as_slice());
    let result = DoorPipeline::new(params()).unwrap().run(&cloud);
    assert!(matches!(result, Err(CloudError::InsufficientPoints { .. })));
}
