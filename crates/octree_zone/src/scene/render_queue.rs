//! Render queue sink fed by the visibility walk
//!
//! The walk never touches materials or GPU state. It only hands opaque
//! renderable handles to a [`RenderQueueSink`], and the collecting
//! [`RenderQueue`] groups them so the renderer can draw world geometry
//! before movable objects.

use crate::foundation::collections::{TileId, ZoneId};

/// Opaque handle to something the renderer knows how to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderableHandle {
    /// Application-defined renderable (mesh instance, particle system, ...)
    Object(u64),
    /// Terrain tile owned by a terrain zone
    TerrainTile {
        /// Terrain zone owning the tile
        zone: ZoneId,
        /// Tile within the zone's page
        tile: TileId,
    },
}

impl RenderableHandle {
    /// Queue group this handle belongs to
    pub fn group(&self) -> RenderGroup {
        match self {
            Self::Object(_) => RenderGroup::Objects,
            Self::TerrainTile { .. } => RenderGroup::WorldGeometry,
        }
    }
}

/// Receives renderables found visible during a frame
pub trait RenderQueueSink {
    /// Queue a renderable for drawing this frame
    fn add_renderable(&mut self, renderable: RenderableHandle);
}

/// Queue group, drawn in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderGroup {
    /// Terrain and other static world geometry
    WorldGeometry,
    /// Movable scene objects
    Objects,
}

/// A batch of renderables sharing the same queue group
#[derive(Debug, Clone)]
pub struct RenderBatch {
    /// Group shared by every renderable in this batch
    pub group: RenderGroup,
    
    /// Renderables in submission order
    pub renderables: Vec<RenderableHandle>,
}

impl RenderBatch {
    /// Create a new empty batch for a group
    pub fn new(group: RenderGroup) -> Self {
        Self {
            group,
            renderables: Vec::new(),
        }
    }
    
    /// Get the number of renderables in this batch
    pub fn len(&self) -> usize {
        self.renderables.len()
    }

    /// True when the batch holds nothing
    pub fn is_empty(&self) -> bool {
        self.renderables.is_empty()
    }
}

/// Collecting render queue for one camera and one frame
#[derive(Debug, Default)]
pub struct RenderQueue {
    batches: Vec<RenderBatch>,
}

impl RenderQueue {
    /// Create an empty render queue
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Batches in draw order
    pub fn batches(&self) -> &[RenderBatch] {
        &self.batches
    }

    /// Renderables of one group
    pub fn group(&self, group: RenderGroup) -> &[RenderableHandle] {
        self.batches
            .iter()
            .find(|batch| batch.group == group)
            .map(|batch| batch.renderables.as_slice())
            .unwrap_or_default()
    }

    /// Total number of queued renderables
    pub fn len(&self) -> usize {
        self.batches.iter().map(RenderBatch::len).sum()
    }

    /// True when nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything queued so far
    pub fn clear(&mut self) {
        self.batches.clear();
    }
}

impl RenderQueueSink for RenderQueue {
    fn add_renderable(&mut self, renderable: RenderableHandle) {
        let group = renderable.group();
        let index = match self.batches.binary_search_by_key(&group, |batch| batch.group) {
            Ok(index) => index,
            Err(index) => {
                self.batches.insert(index, RenderBatch::new(group));
                index
            }
        };
        self.batches[index].renderables.push(renderable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;

    #[test]
    fn test_render_queue_groups_world_geometry_first() {
        let mut zones: SlotMap<ZoneId, ()> = SlotMap::with_key();
        let mut tiles: SlotMap<TileId, ()> = SlotMap::with_key();
        let zone = zones.insert(());
        let tile = tiles.insert(());

        let mut queue = RenderQueue::new();
        queue.add_renderable(RenderableHandle::Object(1));
        queue.add_renderable(RenderableHandle::TerrainTile { zone, tile });
        queue.add_renderable(RenderableHandle::Object(2));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.batches()[0].group, RenderGroup::WorldGeometry);
        assert_eq!(queue.group(RenderGroup::Objects), &[RenderableHandle::Object(1), RenderableHandle::Object(2)]);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.group(RenderGroup::Objects).is_empty());
    }
}
