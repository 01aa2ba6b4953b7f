//! Mapping from acceleration-structure primitive ordinals back to mesh
//! entities.

use meshtrace_mesh::{MeshId, Sense};

/// One primitive slot of a tree.
///
/// Trees address primitives by a dense internal ordinal assigned at
/// build time; the primitive-reference array, indexed by that ordinal,
/// recovers the mesh primitive id and its orientation sense with respect
/// to the tree's volume. Built once per tree and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveRef {
    /// Mesh id of the triangle or tetrahedron.
    pub primitive_id: MeshId,
    /// Orientation of the owning surface with respect to the tree's
    /// volume. Always `Forward` for element trees.
    pub sense: Sense,
}
