//! Zone walk-through demo
//!
//! Builds a heightmap meadow with a hall behind a doorway, scatters props in
//! both zones and walks an actor through the door. Every frame prints what
//! the camera sees, the LOD picked for each terrain tile and any home zone
//! change of the walker.
//!
//! Pass a `.toml` or `.ron` scene config path as the first argument to
//! override the defaults.

use octree_zone::foundation::logging;
use octree_zone::prelude::*;
use octree_zone::terrain::{HeightData, HeightmapPageSource, PageSourceRegistry, TerrainSettings};
use rand::Rng;

// Terrain page: 33x33 samples stretched over 128x128 world units
const PAGE_SIZE: usize = 33;
const PAGE_WORLD: f32 = 128.0;
const MAX_HEIGHT: f32 = 8.0;

// Doorway into the hall, in the z = DOOR_Z plane
const DOOR_Z: f32 = 2.0;
const DOOR_CENTER_X: f32 = 64.0;
const DOOR_HALF_WIDTH: f32 = 3.0;
const DOOR_HEIGHT: f32 = 6.0;

const NUM_MEADOW_PROPS: usize = 40;
const NUM_HALL_PROPS: usize = 12;
const WALKER_HALF_SIZE: f32 = 0.4;
const WALKER_STEP: f32 = 0.5;
const FRAMES: usize = 30;

struct Walker {
    entity: EntityId,
    velocity: Vec3,
    last_zone: Option<ZoneId>,
}

struct ZoneDemoApp {
    scene: ZoneSceneManager,
    meadow: ZoneId,
    hall: ZoneId,
    camera: CameraId,
    walker: Walker,
    queue: RenderQueue,
}

impl ZoneDemoApp {
    fn new(config: SceneConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut scene = ZoneSceneManager::with_config(config);
        let meadow = scene.create_zone("meadow", ZoneType::Terrain)?;
        let hall = scene.create_zone("hall", ZoneType::Octree)?;

        let mut camera = Camera::perspective(Vec3::new(DOOR_CENTER_X, 8.0, 40.0), 60.0, 4.0 / 3.0, 0.1, 500.0);
        camera.look_at(Vec3::new(DOOR_CENTER_X, 2.0, DOOR_Z), Vec3::y());
        let camera = scene.create_camera(camera, meadow)?;

        let mut sources = PageSourceRegistry::new();
        sources.register("Heightmap", Box::new(HeightmapPageSource::new(rolling_hills())))?;
        scene.configure_terrain(meadow, &terrain_settings(), &mut sources)?;

        Self::build_hall(&mut scene, meadow, hall)?;

        let mut rng = rand::thread_rng();
        Self::scatter_props(&mut scene, &mut rng, meadow, hall)?;

        let start = Vec3::new(DOOR_CENTER_X, 1.5, DOOR_Z + 8.0);
        let half = Vec3::new(WALKER_HALF_SIZE, WALKER_HALF_SIZE, WALKER_HALF_SIZE);
        let entity = scene.create_entity("walker", Aabb::from_center_half_size(start, half));
        scene.add_entity_to_zone(entity, meadow)?;
        scene.attach_renderable(entity, RenderableHandle::Object(0))?;

        Ok(Self {
            scene,
            meadow,
            hall,
            camera,
            walker: Walker {
                entity,
                velocity: Vec3::new(0.0, 0.0, -WALKER_STEP),
                last_zone: Some(meadow),
            },
            queue: RenderQueue::new(),
        })
    }

    /// Hall shell behind the doorway plus the two linked door portals
    fn build_hall(scene: &mut ZoneSceneManager, meadow: ZoneId, hall: ZoneId) -> Result<(), SceneError> {
        let (left, right) = (DOOR_CENTER_X - DOOR_HALF_WIDTH, DOOR_CENTER_X + DOOR_HALF_WIDTH);
        let door_out = scene.create_portal(
            meadow,
            Portal::quad(
                "hall_door",
                [
                    Vec3::new(left, 0.0, DOOR_Z),
                    Vec3::new(right, 0.0, DOOR_Z),
                    Vec3::new(right, DOOR_HEIGHT, DOOR_Z),
                    Vec3::new(left, DOOR_HEIGHT, DOOR_Z),
                ],
            ),
        )?;
        let door_in = scene.create_portal(
            hall,
            Portal::quad(
                "hall_door",
                [
                    Vec3::new(left, DOOR_HEIGHT, DOOR_Z),
                    Vec3::new(right, DOOR_HEIGHT, DOOR_Z),
                    Vec3::new(right, 0.0, DOOR_Z),
                    Vec3::new(left, 0.0, DOOR_Z),
                ],
            ),
        )?;
        scene.connect_portals(door_out, door_in)?;

        let shell = scene.create_entity(
            "hall_shell",
            Aabb::new(Vec3::new(40.0, 0.0, -40.0), Vec3::new(88.0, 12.0, DOOR_Z - 0.5)),
        );
        scene.set_zone_enclosure(hall, shell)?;
        log::info!("Hall linked to meadow through 'hall_door'");
        Ok(())
    }

    fn scatter_props(
        scene: &mut ZoneSceneManager,
        rng: &mut impl Rng,
        meadow: ZoneId,
        hall: ZoneId,
    ) -> Result<(), SceneError> {
        for i in 0..NUM_MEADOW_PROPS {
            let x = rng.gen_range(8.0..PAGE_WORLD - 8.0);
            let z = rng.gen_range(DOOR_Z + 6.0..PAGE_WORLD - 8.0);
            let ground = scene
                .terrain_zone(meadow)
                .map_or(0.0, |terrain| terrain.height_at(x, z).max(0.0));
            let half = rng.gen_range(0.3..1.5);
            let id = scene.create_entity(
                format!("rock_{i}"),
                Aabb::from_center_half_size(Vec3::new(x, ground + half, z), Vec3::new(half, half, half)),
            );
            scene.add_entity_to_zone(id, meadow)?;
            scene.attach_renderable(id, RenderableHandle::Object(1 + i as u64))?;
        }

        for i in 0..NUM_HALL_PROPS {
            let center = Vec3::new(rng.gen_range(44.0..84.0), 1.0, rng.gen_range(-36.0..-4.0));
            let id = scene.create_entity(
                format!("crate_{i}"),
                Aabb::from_center_half_size(center, Vec3::new(0.8, 1.0, 0.8)),
            );
            if scene.entity(id).and_then(SceneEntity::home_zone) != Some(hall) {
                scene.add_entity_to_zone(id, hall)?;
            }
            scene.attach_renderable(id, RenderableHandle::Object(1000 + i as u64))?;
        }
        Ok(())
    }

    fn run(mut self) -> Result<(), SceneError> {
        for frame in 0..FRAMES {
            self.scene.translate_entity(self.walker.entity, self.walker.velocity)?;
            self.scene.update_scene();
            self.report_home_zone(frame);

            self.queue.clear();
            let visible = self.scene.find_visible_objects(self.camera, &mut self.queue)?;
            println!(
                "frame {:>2}: {:>3} entities, {} zones, {} portals, {} queued",
                frame,
                visible.entities.len(),
                visible.zones.len(),
                visible.portals.len(),
                self.queue.len()
            );
            self.report_tiles();
        }
        Ok(())
    }

    fn report_home_zone(&mut self, frame: usize) {
        let Some(entity) = self.scene.entity(self.walker.entity) else {
            return;
        };
        let home = entity.home_zone();
        if home != self.walker.last_zone {
            let name = |zone: Option<ZoneId>| {
                zone.and_then(|id| self.scene.zone(id))
                    .map_or("<none>".to_string(), |zone| zone.name().to_string())
            };
            println!(
                "frame {:>2}: walker moved from '{}' to '{}' at z = {:.1}",
                frame,
                name(self.walker.last_zone),
                name(home),
                entity.position().z
            );
            self.walker.last_zone = home;
        }
        if home == Some(self.hall) {
            log::debug!("Walker visiting {:?}", entity.visiting_zones());
        }
    }

    fn report_tiles(&self) {
        let Some(terrain) = self.scene.terrain_zone(self.meadow) else {
            return;
        };
        let levels: Vec<String> = terrain
            .visible_tiles()
            .iter()
            .filter_map(|id| terrain.tile(*id))
            .map(|tile| format!("{}@{}", tile.name(), tile.render_level()))
            .collect();
        println!("          tiles: {}", levels.join(" "));
    }
}

fn terrain_settings() -> TerrainSettings {
    TerrainSettings::from_pairs([
        ("PageSize", PAGE_SIZE.to_string()),
        ("TileSize", "17".to_string()),
        ("PageWorldX", PAGE_WORLD.to_string()),
        ("PageWorldZ", PAGE_WORLD.to_string()),
        ("MaxHeight", MAX_HEIGHT.to_string()),
        ("MaxMipMapLevel", "3".to_string()),
        ("PageSource", "Heightmap".to_string()),
    ])
}

/// Gentle sine hills, flattened near the doorway
fn rolling_hills() -> HeightData {
    let data = (0..PAGE_SIZE * PAGE_SIZE)
        .map(|i| {
            let (x, z) = ((i % PAGE_SIZE) as f32, (i / PAGE_SIZE) as f32);
            let hills = (x * 0.4).sin() * (z * 0.3).cos() * 0.5 + 0.5;
            let flatten = if z < 4.0 { 0.1 } else { 1.0 };
            (hills * flatten * 255.0) as u8
        })
        .collect();
    HeightData::from_u8(PAGE_SIZE, PAGE_SIZE, data)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading scene config from {path}");
            SceneConfig::load_from_file(&path)?
        }
        None => SceneConfig::default(),
    };

    println!("=== Zone Walk-through Demo ===");
    println!("A walker crosses from the meadow into the hall over {FRAMES} frames.");
    println!();

    let app = ZoneDemoApp::new(config)?;
    app.run()?;
    Ok(())
}
