//! Visibility walks through portals and anti-portals

use super::*;
use crate::scene::{RenderQueue, RenderableHandle, SceneConfig};

#[test]
fn test_walk_sees_through_doorway_only() {
    let TwoRooms {
        mut scene,
        room,
        door_out,
        ..
    } = two_rooms();
    let framed = scene.create_entity("framed", cube(Vec3::new(0.0, 0.0, -20.0), 0.5));
    let hidden = scene.create_entity("hidden", cube(Vec3::new(10.0, 0.0, -20.0), 0.5));
    scene.add_entity_to_zone(framed, room).unwrap();
    scene.add_entity_to_zone(hidden, room).unwrap();
    scene.attach_renderable(framed, RenderableHandle::Object(1)).unwrap();
    scene.attach_renderable(hidden, RenderableHandle::Object(2)).unwrap();
    scene.update_scene();

    let camera = scene.create_camera(camera_at_origin(), scene.default_zone()).unwrap();
    let mut queue = RenderQueue::new();
    let visible = scene.find_visible_objects(camera, &mut queue).unwrap();

    assert_eq!(visible.zones, vec![scene.default_zone(), room]);
    assert_eq!(visible.portals, vec![door_out]);
    assert_eq!(visible.entities, vec![framed]);
    assert_eq!(queue.len(), 1);

    let frame = scene.frame();
    assert!(scene.entity(framed).unwrap().is_visible_in(frame, camera));
    assert!(!scene.entity(hidden).unwrap().is_visible_in(frame, camera));
    assert_eq!(scene.octree_zone(room).unwrap().last_visible_frame(), frame);

    // Culling planes are gone once the walk is done
    assert!(scene.camera(camera).unwrap().extra_frustum().active_planes().is_empty());
}

#[test]
fn test_closed_door_hides_room() {
    let TwoRooms {
        mut scene,
        room,
        door_out,
        ..
    } = two_rooms();
    let framed = scene.create_entity("framed", cube(Vec3::new(0.0, 0.0, -20.0), 0.5));
    scene.add_entity_to_zone(framed, room).unwrap();
    scene.portal_mut(door_out).unwrap().close();

    let camera = scene.create_camera(camera_at_origin(), scene.default_zone()).unwrap();
    let visible = scene.find_visible_objects(camera, &mut RenderQueue::new()).unwrap();

    assert_eq!(visible.zones, vec![scene.default_zone()]);
    assert!(visible.entities.is_empty());
}

#[test]
fn test_anti_portal_hides_doorway_behind_it() {
    let TwoRooms {
        mut scene,
        room,
        door_out,
        ..
    } = two_rooms();
    let framed = scene.create_entity("framed", cube(Vec3::new(0.0, 0.0, -20.0), 0.5));
    scene.add_entity_to_zone(framed, room).unwrap();
    let pillar = scene
        .create_anti_portal(scene.default_zone(), doorway("pillar", -5.0, 3.0))
        .unwrap();
    assert!(scene.portal(pillar).unwrap().is_anti_portal());

    let camera = scene.create_camera(camera_at_origin(), scene.default_zone()).unwrap();
    let visible = scene.find_visible_objects(camera, &mut RenderQueue::new()).unwrap();

    assert_eq!(visible.zones, vec![scene.default_zone()]);
    assert_eq!(visible.occluded_portals, vec![door_out]);
    assert!(visible.entities.is_empty());
}

#[test]
fn test_portal_depth_limit_stops_walk() {
    let mut scene = ZoneSceneManager::with_config(SceneConfig {
        max_portal_depth: 0,
        ..SceneConfig::default()
    });
    let room = scene.create_zone("room", ZoneType::Octree).unwrap();
    let door_out = scene
        .create_portal(scene.default_zone(), doorway("door", -10.0, 1.0))
        .unwrap();
    let door_in = scene.create_portal(room, reversed_doorway("door", -10.0, 1.0)).unwrap();
    scene.connect_portals(door_out, door_in).unwrap();
    let framed = scene.create_entity("framed", cube(Vec3::new(0.0, 0.0, -20.0), 0.5));
    scene.add_entity_to_zone(framed, room).unwrap();

    let camera = scene.create_camera(camera_at_origin(), scene.default_zone()).unwrap();
    let visible = scene.find_visible_objects(camera, &mut RenderQueue::new()).unwrap();

    assert_eq!(visible.zones, vec![scene.default_zone()]);
    assert!(visible.portals.is_empty());
    assert!(visible.entities.is_empty());
}

#[test]
fn test_camera_follows_attached_entity() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let rig = scene.create_entity("rig", cube(Vec3::new(0.0, 0.0, -9.0), 0.25));
    let camera = scene.create_camera(camera_at_origin(), scene.default_zone()).unwrap();
    scene.attach_camera_to_entity(camera, rig).unwrap();

    scene.translate_entity(rig, Vec3::new(0.0, 0.0, -2.0)).unwrap();
    scene.update_scene();

    assert_eq!(scene.camera(camera).unwrap().home_zone(), Some(room));
}

#[test]
fn test_unknown_camera_is_an_error() {
    let TwoRooms { mut scene, .. } = two_rooms();
    let camera = scene.create_camera(camera_at_origin(), scene.default_zone()).unwrap();
    scene.destroy_camera(camera).unwrap();

    assert!(scene.primary_camera().is_none());
    assert!(matches!(
        scene.find_visible_objects(camera, &mut RenderQueue::new()),
        Err(crate::scene::SceneError::UnknownCamera(_))
    ));
}
