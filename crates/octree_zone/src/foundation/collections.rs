//! Arena handles and collection aliases
//!
//! Every back-reference in the scene (octant parent, entity home zone,
//! portal target, terrain tile neighbour) is one of these keys rather than
//! a pointer, so ownership stays strictly tree-shaped.

pub use slotmap::{SecondaryMap, SlotMap};

slotmap::new_key_type! {
    /// Handle to a scene entity owned by the scene manager
    pub struct EntityId;

    /// Handle to a zone owned by the scene manager
    pub struct ZoneId;

    /// Handle to a portal or anti-portal owned by the scene manager
    pub struct PortalId;

    /// Handle to a node of a zone's octree
    pub struct OctantId;

    /// Handle to a terrain tile owned by a terrain page
    pub struct TileId;

    /// Handle to a camera registered with the scene manager
    pub struct CameraId;
}
