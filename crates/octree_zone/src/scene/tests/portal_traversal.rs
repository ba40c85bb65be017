//! Home zones, visitors and queries across portals

use super::*;
use crate::foundation::math::Transform;
use crate::scene::{SceneError, DEFAULT_ZONE_NAME};
use crate::spatial::{QueryShape, Sphere};

#[test]
fn test_entity_crossing_doorway_changes_home_zone() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let walker = scene.create_entity("walker", cube(Vec3::new(0.0, 0.0, -9.0), 0.25));
    assert_eq!(scene.entity(walker).unwrap().home_zone(), Some(scene.default_zone()));

    scene.translate_entity(walker, Vec3::new(0.0, 0.0, -2.0)).unwrap();
    scene.update_scene();

    let entity = scene.entity(walker).unwrap();
    assert_eq!(entity.home_zone(), Some(room));
    assert!(entity.visiting_zones().is_empty());
    assert!(scene.octree_zone(room).unwrap().home_entities().contains(&walker));
    assert!(!scene.octree_zone(scene.default_zone()).unwrap().contains_entity(walker));
}

#[test]
fn test_entity_missing_the_opening_stays_home() {
    let TwoRooms { mut scene, .. } = two_rooms();
    let walker = scene.create_entity("walker", cube(Vec3::new(5.0, 0.0, -9.0), 0.25));

    scene.translate_entity(walker, Vec3::new(0.0, 0.0, -2.0)).unwrap();
    scene.update_scene();

    assert_eq!(scene.entity(walker).unwrap().home_zone(), Some(scene.default_zone()));
}

#[test]
fn test_anchored_entity_does_not_follow_portals() {
    let TwoRooms { mut scene, .. } = two_rooms();
    let walker = scene.create_entity("walker", cube(Vec3::new(0.0, 0.0, -9.0), 0.25));
    scene.entity_mut(walker).unwrap().set_anchored(true);

    scene.translate_entity(walker, Vec3::new(0.0, 0.0, -2.0)).unwrap();
    scene.update_scene();

    assert_eq!(scene.entity(walker).unwrap().home_zone(), Some(scene.default_zone()));
}

#[test]
fn test_straddling_entity_visits_neighbour_zone() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let crate_box = scene.create_entity("crate", cube(Vec3::new(0.0, 0.0, -9.8), 0.5));
    scene.update_scene();

    let entity = scene.entity(crate_box).unwrap();
    assert_eq!(entity.home_zone(), Some(scene.default_zone()));
    assert_eq!(entity.visiting_zones(), &[room]);
    assert!(scene.octree_zone(room).unwrap().visitor_entities().contains(&crate_box));
    assert!(scene.octree_zone(room).unwrap().zone_data(crate_box).unwrap().visitor);

    // Moving away clears the visit on the next update
    scene.translate_entity(crate_box, Vec3::new(0.0, 0.0, 5.0)).unwrap();
    scene.update_scene();
    assert!(scene.entity(crate_box).unwrap().visiting_zones().is_empty());
    assert!(!scene.octree_zone(room).unwrap().contains_entity(crate_box));
}

#[test]
fn test_entities_that_may_not_visit_stay_out() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let crate_box = scene.create_entity("crate", cube(Vec3::new(0.0, 0.0, -9.8), 0.5));
    scene.entity_mut(crate_box).unwrap().set_allow_to_visit(false);
    scene.update_scene();

    assert!(scene.entity(crate_box).unwrap().visiting_zones().is_empty());
    assert!(!scene.octree_zone(room).unwrap().contains_entity(crate_box));
}

#[test]
fn test_back_touch_moves_home_only_when_allowed() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let leaning = scene.create_entity("leaning", cube(Vec3::new(0.0, 0.0, -10.2), 0.5));
    assert_eq!(scene.entity(leaning).unwrap().visiting_zones(), &[room]);

    assert_eq!(scene.update_node_home_zone(leaning, false).unwrap(), scene.default_zone());
    assert_eq!(scene.update_node_home_zone(leaning, true).unwrap(), room);

    let entity = scene.entity(leaning).unwrap();
    assert_eq!(entity.home_zone(), Some(room));
    assert!(!entity.visiting_zones().contains(&room));
}

#[test]
fn test_query_follows_portal_cycle_once() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let a = scene.create_entity("a", cube(Vec3::new(0.0, 0.0, -8.0), 0.5));
    let b = scene.create_entity("b", cube(Vec3::new(0.0, 0.0, -12.0), 0.5));
    scene.add_entity_to_zone(b, room).unwrap();

    let shape = QueryShape::Sphere(Sphere::new(Vec3::new(0.0, 0.0, -10.0), 3.0));
    let found = scene.find_entities(scene.default_zone(), &shape, false, true, None);
    assert_eq!(found, vec![a, b]);

    let local = scene.find_entities(scene.default_zone(), &shape, false, false, None);
    assert_eq!(local, vec![a]);

    let from_room = scene.find_entities(room, &shape, false, true, Some(b));
    assert_eq!(from_room, vec![a]);
}

#[test]
fn test_small_portal_moves_through_doorway() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let hatch = scene
        .create_portal(scene.default_zone(), doorway("hatch", -9.0, 0.2))
        .unwrap();

    scene
        .portal_mut(hatch)
        .unwrap()
        .set_transform(Transform::from_position(Vec3::new(0.0, 0.0, -2.0)));
    scene.update_scene();

    assert_eq!(scene.portal(hatch).unwrap().current_home_zone(), Some(room));
    assert!(scene.octree_zone(room).unwrap().portals().contains(&hatch));
    assert!(!scene.octree_zone(scene.default_zone()).unwrap().portals().contains(&hatch));
}

#[test]
fn test_duplicate_names_are_rejected() {
    let TwoRooms { mut scene, room, .. } = two_rooms();

    assert_eq!(
        scene.create_zone("room", ZoneType::Octree),
        Err(SceneError::DuplicateZone("room".to_string()))
    );
    assert_eq!(
        scene.create_portal(room, doorway("door", -30.0, 1.0)),
        Err(SceneError::DuplicatePortal {
            zone: "room".to_string(),
            portal: "door".to_string(),
        })
    );
    assert!(scene.create_portal(room, doorway("window", -30.0, 1.0)).is_ok());
}

#[test]
fn test_connect_portals_by_location() {
    let mut scene = ZoneSceneManager::new();
    let cellar = scene.create_zone("cellar", ZoneType::Octree).unwrap();
    let top = scene
        .create_portal(scene.default_zone(), doorway("stairs", -10.0, 1.0))
        .unwrap();
    let bottom = scene.create_portal(cellar, reversed_doorway("stairs", -10.0, 1.0)).unwrap();

    assert_eq!(scene.connect_portals_by_location(), Ok(1));
    assert_eq!(scene.portal(top).unwrap().target_zone(), Some(cellar));
    assert_eq!(scene.portal(top).unwrap().target_portal(), Some(bottom));
    assert_eq!(scene.portal(bottom).unwrap().target_zone(), Some(scene.default_zone()));

    scene.create_portal(cellar, doorway("drain", -50.0, 1.0)).unwrap();
    assert_eq!(
        scene.connect_portals_by_location(),
        Err(SceneError::MissingTargetZone("drain".to_string()))
    );
}

#[test]
fn test_destroy_zone_rehomes_entities_and_cameras() {
    let TwoRooms {
        mut scene,
        room,
        door_out,
        door_in,
    } = two_rooms();
    let walker = scene.create_entity("walker", cube(Vec3::new(0.0, 0.0, -9.0), 0.25));
    scene.translate_entity(walker, Vec3::new(0.0, 0.0, -2.0)).unwrap();
    scene.update_scene();
    let camera = scene.create_camera(camera_at_origin(), room).unwrap();

    scene.destroy_zone(room).unwrap();

    let default_zone = scene.default_zone();
    assert!(scene.zone(room).is_none());
    assert!(scene.portal(door_in).is_none());
    assert_eq!(scene.portal(door_out).unwrap().target_zone(), None);
    assert_eq!(scene.entity(walker).unwrap().home_zone(), Some(default_zone));
    assert!(scene.octree_zone(default_zone).unwrap().contains_entity(walker));
    assert_eq!(scene.camera(camera).unwrap().home_zone(), Some(default_zone));

    assert_eq!(
        scene.destroy_zone(default_zone),
        Err(SceneError::CannotDestroyDefaultZone)
    );
    assert_eq!(scene.zone_by_name(DEFAULT_ZONE_NAME), Some(default_zone));
}

#[test]
fn test_enclosure_anchors_entity_and_claims_points() {
    let TwoRooms { mut scene, room, .. } = two_rooms();
    let shell = scene.create_entity(
        "shell",
        Aabb::new(Vec3::new(-20.0, -5.0, -40.0), Vec3::new(20.0, 5.0, -11.0)),
    );
    scene.set_zone_enclosure(room, shell).unwrap();

    let entity = scene.entity(shell).unwrap();
    assert!(entity.is_anchored());
    assert_eq!(entity.home_zone(), Some(room));
    assert_eq!(scene.octree_zone(room).unwrap().enclosure(), Some(shell));

    assert_eq!(scene.find_zone_for_point(Vec3::new(0.0, 0.0, -20.0)), room);
    assert_eq!(scene.find_zone_for_point(Vec3::new(0.0, 0.0, 20.0)), scene.default_zone());

    let inside = scene.create_entity("inside", cube(Vec3::new(3.0, 0.0, -30.0), 0.5));
    assert_eq!(scene.entity(inside).unwrap().home_zone(), Some(room));
}
