//! Scenario tests for zones, portals and terrain working together

mod portal_traversal;
mod visibility_walk;

use crate::foundation::collections::{PortalId, ZoneId};
use crate::foundation::math::Vec3;
use crate::scene::{Camera, Portal, ZoneSceneManager, ZoneType};
use crate::spatial::Aabb;

/// Default zone and a room joined by a 2x2 doorway in the z = -10 plane.
/// The default zone lies on the +Z side.
struct TwoRooms {
    scene: ZoneSceneManager,
    room: ZoneId,
    door_out: PortalId,
    door_in: PortalId,
}

fn doorway(name: &str, z: f32, half: f32) -> Portal {
    Portal::quad(
        name,
        [
            Vec3::new(-half, -half, z),
            Vec3::new(half, -half, z),
            Vec3::new(half, half, z),
            Vec3::new(-half, half, z),
        ],
    )
}

fn reversed_doorway(name: &str, z: f32, half: f32) -> Portal {
    Portal::quad(
        name,
        [
            Vec3::new(-half, half, z),
            Vec3::new(half, half, z),
            Vec3::new(half, -half, z),
            Vec3::new(-half, -half, z),
        ],
    )
}

fn two_rooms() -> TwoRooms {
    let mut scene = ZoneSceneManager::new();
    let room = scene.create_zone("room", ZoneType::Octree).unwrap();
    let door_out = scene
        .create_portal(scene.default_zone(), doorway("door", -10.0, 1.0))
        .unwrap();
    let door_in = scene.create_portal(room, reversed_doorway("door", -10.0, 1.0)).unwrap();
    scene.connect_portals(door_out, door_in).unwrap();

    TwoRooms {
        scene,
        room,
        door_out,
        door_in,
    }
}

fn cube(center: Vec3, half: f32) -> Aabb {
    Aabb::from_center_half_size(center, Vec3::new(half, half, half))
}

/// 90 degree camera at the origin looking down -Z
fn camera_at_origin() -> Camera {
    let mut camera = Camera::perspective(Vec3::zeros(), 90.0, 1.0, 0.1, 1000.0);
    camera.set_target(Vec3::new(0.0, 0.0, -1.0));
    camera
}
