//! Loose octree spatial partitioning structure
//!
//! Octants live in a slot-map arena owned by the tree. Each octant keeps
//! the handles of its (lazily created) children and of its parent, so
//! walking in either direction never needs a pointer back into the arena.
//!
//! The tree is "loose": an octant's culling volume is its box grown by its
//! half size on every side, so entities whose center lies in an octant may
//! protrude up to half an octant past its nominal box.

use std::collections::HashSet;

use crate::foundation::collections::{EntityId, OctantId, SlotMap};
use crate::foundation::math::Vec3;
use super::bounds::Aabb;
use super::intersection::{Intersection, QueryShape};

/// Single node in the octree hierarchy
#[derive(Debug, Clone)]
pub struct Octant {
    bounds: Aabb,
    half_size: Vec3,
    children: [Option<OctantId>; 8],
    parent: Option<OctantId>,
    entities: HashSet<EntityId>,
    ref_count: usize,
    depth: u32,
}

impl Octant {
    fn new(bounds: Aabb, parent: Option<OctantId>, depth: u32) -> Self {
        Self {
            half_size: bounds.half_size(),
            bounds,
            children: [None; 8],
            parent,
            entities: HashSet::new(),
            ref_count: 0,
            depth,
        }
    }

    /// Nominal box of this octant
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Half size used as the loose margin
    pub fn half_size(&self) -> Vec3 {
        self.half_size
    }

    /// Culling volume: the box grown by the half size on every side
    pub fn cull_bounds(&self) -> Aabb {
        self.bounds.grown(self.half_size)
    }

    /// Parent octant, `None` for the root
    pub fn parent(&self) -> Option<OctantId> {
        self.parent
    }

    /// Child slot for an octant index (0-7)
    pub fn child(&self, index: usize) -> Option<OctantId> {
        self.children.get(index).copied().flatten()
    }

    /// Children that have been created so far
    pub fn children(&self) -> impl Iterator<Item = OctantId> + '_ {
        self.children.iter().flatten().copied()
    }

    /// Entities stored directly at this octant
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    /// True if the entity is stored directly at this octant
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Number of entities stored directly at this octant
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of entities at this octant and below
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Depth in the tree (0 = root)
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// True when every axis of `aabb` is at most half this octant's size,
    /// i.e. the box is small enough to be pushed into a child.
    pub fn is_twice_size(&self, aabb: &Aabb) -> bool {
        if aabb.is_infinite() {
            return false;
        }
        let half = self.bounds.half_size();
        let size = aabb.size();
        size.x <= half.x && size.y <= half.y && size.z <= half.z
    }

    /// Octant index (0-7) of the child that contains the center of `aabb`.
    /// Ties go to the lower half.
    pub fn child_index(&self, aabb: &Aabb) -> usize {
        let center = self.bounds.center();
        let target = aabb.center();

        let x_bit = usize::from(target.x > center.x);
        let y_bit = usize::from(target.y > center.y);
        let z_bit = usize::from(target.z > center.z);

        // Octant layout:
        // 0: -X, -Y, -Z (back-bottom-left)
        // 1: +X, -Y, -Z (back-bottom-right)
        // 2: -X, +Y, -Z (back-top-left)
        // 3: +X, +Y, -Z (back-top-right)
        // 4: -X, -Y, +Z (front-bottom-left)
        // 5: +X, -Y, +Z (front-bottom-right)
        // 6: -X, +Y, +Z (front-top-left)
        // 7: +X, +Y, +Z (front-top-right)
        (z_bit << 2) | (y_bit << 1) | x_bit
    }

    /// Box of the child at `index`, bisecting this octant along each axis
    pub fn child_bounds(&self, index: usize) -> Aabb {
        let mut min = self.bounds.min;
        let mut max = self.bounds.max;
        let mid = self.bounds.center();

        for axis in 0..3 {
            if index & (1 << axis) == 0 {
                max[axis] = mid[axis];
            } else {
                min[axis] = mid[axis];
            }
        }

        Aabb::new(min, max)
    }
}

/// Loose octree owning its octants
#[derive(Debug, Clone)]
pub struct Octree {
    octants: SlotMap<OctantId, Octant>,
    root: OctantId,
    max_depth: u32,
}

impl Octree {
    /// Create an octree with a single root octant
    pub fn new(bounds: Aabb, max_depth: u32) -> Self {
        let mut octants = SlotMap::with_key();
        let root = octants.insert(Octant::new(bounds, None, 0));
        Self { octants, root, max_depth }
    }

    /// Handle of the root octant
    pub fn root(&self) -> OctantId {
        self.root
    }

    /// The root octant
    pub fn root_octant(&self) -> &Octant {
        &self.octants[self.root]
    }

    /// Look up an octant
    pub fn octant(&self, id: OctantId) -> Option<&Octant> {
        self.octants.get(id)
    }

    /// Maximum subdivision depth
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Number of octants currently allocated
    pub fn octant_count(&self) -> usize {
        self.octants.len()
    }

    /// Store `entity` at `octant` and bump the reference counts up to the root
    pub fn add_entity(&mut self, octant: OctantId, entity: EntityId) {
        let Some(node) = self.octants.get_mut(octant) else {
            return;
        };
        if !node.entities.insert(entity) {
            return;
        }

        let mut current = Some(octant);
        while let Some(id) = current {
            let node = &mut self.octants[id];
            node.ref_count += 1;
            current = node.parent;
        }
    }

    /// Remove `entity` from `octant`. Absent entities are ignored.
    ///
    /// Emptied octants are kept; see [`Octree::prune_empty`].
    pub fn remove_entity(&mut self, octant: OctantId, entity: EntityId) -> bool {
        let Some(node) = self.octants.get_mut(octant) else {
            return false;
        };
        if !node.entities.remove(&entity) {
            return false;
        }

        let mut current = Some(octant);
        while let Some(id) = current {
            let node = &mut self.octants[id];
            node.ref_count = node.ref_count.saturating_sub(1);
            current = node.parent;
        }
        true
    }

    /// Child of `octant` at `index`, creating it on first use
    pub fn child_or_create(&mut self, octant: OctantId, index: usize) -> OctantId {
        let node = &self.octants[octant];
        if let Some(child) = node.child(index) {
            return child;
        }

        let bounds = node.child_bounds(index);
        let depth = node.depth + 1;
        let child = self.octants.insert(Octant::new(bounds, Some(octant), depth));
        self.octants[octant].children[index] = Some(child);
        log::trace!("Created octant {:?} (depth {}) under {:?}", child, depth, octant);
        child
    }

    /// True if `descendant` is `ancestor` or lies beneath it
    pub fn is_descendant(&self, descendant: OctantId, ancestor: OctantId) -> bool {
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.octants.get(id).and_then(Octant::parent);
        }
        false
    }

    /// Collect entities overlapping `shape`.
    ///
    /// `candidate` maps an entity stored in the tree to the world box it
    /// should be tested with, or `None` to skip it (excluded entity,
    /// filtered visitor, entity without bounds).
    pub fn find_entities<F>(&self, shape: &QueryShape, results: &mut Vec<EntityId>, candidate: F)
    where
        F: Fn(EntityId) -> Option<Aabb>,
    {
        self.find_in_octant(self.root, shape, false, results, &candidate);
    }

    fn find_in_octant<F>(
        &self,
        octant: OctantId,
        shape: &QueryShape,
        fully_contained: bool,
        results: &mut Vec<EntityId>,
        candidate: &F,
    ) where
        F: Fn(EntityId) -> Option<Aabb>,
    {
        let node = &self.octants[octant];
        let mut full = fully_contained;

        if !full {
            match shape.classify(&node.cull_bounds()) {
                Intersection::Outside => return,
                Intersection::Inside => full = true,
                Intersection::Intersect => {}
            }
        }

        for entity in node.entities.iter().copied() {
            let Some(aabb) = candidate(entity) else {
                continue;
            };
            if full || shape.classify(&aabb) != Intersection::Outside {
                results.push(entity);
            }
        }

        for child in node.children() {
            self.find_in_octant(child, shape, full, results, candidate);
        }
    }

    /// Drop every octant subtree that holds no entities.
    ///
    /// Never called implicitly: removal leaves empty octants allocated so
    /// that entities moving back and forth do not churn the arena.
    pub fn prune_empty(&mut self) -> usize {
        let mut removed = 0;
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            for index in 0..8 {
                let Some(child) = self.octants[id].children[index] else {
                    continue;
                };
                if self.octants[child].ref_count == 0 {
                    self.octants[id].children[index] = None;
                    removed += self.remove_subtree(child);
                } else {
                    stack.push(child);
                }
            }
        }

        if removed > 0 {
            log::debug!("Pruned {} empty octants", removed);
        }
        removed
    }

    fn remove_subtree(&mut self, root: OctantId) -> usize {
        let mut removed = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.octants.remove(id) {
                stack.extend(node.children.iter().flatten());
                removed += 1;
            }
        }
        removed
    }

    /// Iterate every octant handle in the tree
    pub fn octant_ids(&self) -> impl Iterator<Item = OctantId> + '_ {
        self.octants.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::bounds::Sphere;

    fn entity_keys(count: usize) -> Vec<EntityId> {
        let mut arena: SlotMap<EntityId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    fn test_tree() -> Octree {
        Octree::new(Aabb::new(Vec3::new(-100.0, -100.0, -100.0), Vec3::new(100.0, 100.0, 100.0)), 2)
    }

    /// Every octant's count equals its own entities plus its children's counts
    fn assert_ref_counts(tree: &Octree) {
        for id in tree.octant_ids() {
            let node = tree.octant(id).unwrap();
            let below: usize = node.children().map(|c| tree.octant(c).unwrap().ref_count()).sum();
            assert_eq!(node.ref_count(), node.entity_count() + below);
        }
    }

    #[test]
    fn test_octree_creation() {
        let tree = test_tree();
        assert_eq!(tree.octant_count(), 1);
        assert_eq!(tree.root_octant().half_size(), Vec3::new(100.0, 100.0, 100.0));
        assert_eq!(tree.max_depth(), 2);
    }

    #[test]
    fn test_octree_child_index() {
        let tree = test_tree();
        let root = tree.root_octant();
        let high = Aabb::from_center_half_size(Vec3::new(50.0, 50.0, 50.0), Vec3::new(5.0, 5.0, 5.0));
        let low = Aabb::from_center_half_size(Vec3::new(-50.0, -50.0, -50.0), Vec3::new(5.0, 5.0, 5.0));
        let mixed = Aabb::from_center_half_size(Vec3::new(50.0, -50.0, 50.0), Vec3::new(5.0, 5.0, 5.0));
        let tie = Aabb::from_center_half_size(Vec3::zeros(), Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(root.child_index(&high), 7);
        assert_eq!(root.child_index(&low), 0);
        assert_eq!(root.child_index(&mixed), 5);
        assert_eq!(root.child_index(&tie), 0);
    }

    #[test]
    fn test_octree_is_twice_size() {
        let tree = test_tree();
        let root = tree.root_octant();
        let small = Aabb::from_center_half_size(Vec3::zeros(), Vec3::new(50.0, 50.0, 50.0));
        let large = Aabb::from_center_half_size(Vec3::zeros(), Vec3::new(50.0, 51.0, 50.0));
        assert!(root.is_twice_size(&small));
        assert!(!root.is_twice_size(&large));
        assert!(!root.is_twice_size(&Aabb::infinite()));
    }

    #[test]
    fn test_octree_child_bounds_and_cull_bounds() {
        let mut tree = test_tree();
        let root = tree.root();
        let child = tree.child_or_create(root, 7);
        let node = tree.octant(child).unwrap();
        assert_eq!(node.bounds().min, Vec3::zeros());
        assert_eq!(node.bounds().max, Vec3::new(100.0, 100.0, 100.0));
        assert_eq!(node.half_size(), Vec3::new(50.0, 50.0, 50.0));
        assert_eq!(node.cull_bounds().min, Vec3::new(-50.0, -50.0, -50.0));
        assert_eq!(node.parent(), Some(root));
        assert_eq!(node.depth(), 1);

        // Second request reuses the slot
        assert_eq!(tree.child_or_create(root, 7), child);
        assert_eq!(tree.octant_count(), 2);
    }

    #[test]
    fn test_octree_ref_counts() {
        let mut tree = test_tree();
        let ids = entity_keys(3);
        let root = tree.root();
        let child = tree.child_or_create(root, 0);
        let grandchild = tree.child_or_create(child, 3);

        tree.add_entity(grandchild, ids[0]);
        tree.add_entity(child, ids[1]);
        tree.add_entity(root, ids[2]);
        assert_eq!(tree.root_octant().ref_count(), 3);
        assert_eq!(tree.octant(child).unwrap().ref_count(), 2);
        assert_ref_counts(&tree);

        assert!(tree.remove_entity(grandchild, ids[0]));
        assert!(!tree.remove_entity(grandchild, ids[0]));
        assert_eq!(tree.root_octant().ref_count(), 2);
        assert_ref_counts(&tree);

        // Emptied octants persist
        assert_eq!(tree.octant_count(), 3);
        assert!(tree.octant(grandchild).is_some());
    }

    #[test]
    fn test_octree_prune_empty() {
        let mut tree = test_tree();
        let ids = entity_keys(1);
        let root = tree.root();
        let full = tree.child_or_create(root, 1);
        let empty = tree.child_or_create(root, 2);
        let _empty_grandchild = tree.child_or_create(empty, 4);
        tree.add_entity(full, ids[0]);

        assert_eq!(tree.prune_empty(), 2);
        assert_eq!(tree.octant_count(), 2);
        assert!(tree.root_octant().child(2).is_none());
        assert_eq!(tree.root_octant().child(1), Some(full));
    }

    #[test]
    fn test_octree_find_entities() {
        let mut tree = test_tree();
        let ids = entity_keys(2);
        let root = tree.root();
        let near = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let far = Aabb::new(Vec3::new(90.0, 90.0, 90.0), Vec3::new(91.0, 91.0, 91.0));
        let child = tree.child_or_create(root, 7);
        tree.add_entity(root, ids[0]);
        tree.add_entity(child, ids[1]);

        let bounds = |id: EntityId| Some(if id == ids[0] { near } else { far });
        let mut results = Vec::new();
        tree.find_entities(&QueryShape::Sphere(Sphere::new(Vec3::zeros(), 10.0)), &mut results, bounds);
        assert_eq!(results, vec![ids[0]]);

        results.clear();
        tree.find_entities(&QueryShape::Box(Aabb::infinite()), &mut results, bounds);
        assert_eq!(results.len(), 2);

        results.clear();
        tree.find_entities(&QueryShape::Box(Aabb::infinite()), &mut results, |id| {
            (id != ids[0]).then_some(far)
        });
        assert_eq!(results, vec![ids[1]]);
    }
}
