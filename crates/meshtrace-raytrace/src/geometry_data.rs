//! Per-surface sidecar data consulted by the intersection filter.

use meshtrace_math::Aabb3;
use meshtrace_mesh::MeshId;

/// Everything the hit filter needs to know about a surface without
/// going back to the mesh manager.
///
/// One record per surface per tree, owned by the tree and dropped with
/// it. The adjacent volume ids orient hits; the bump is the numerical
/// tolerance used to nudge ray origins off this surface's facets and to
/// inflate single-precision bounds on GPU backends.
#[derive(Debug, Clone)]
pub struct GeometryUserData {
    /// Mesh id of the surface.
    pub surface_id: MeshId,
    /// Volume the facet normals point out of.
    pub forward_volume: MeshId,
    /// Volume the facet normals point into ([`meshtrace_mesh::ID_NONE`]
    /// for the exterior).
    pub reverse_volume: MeshId,
    /// Bounding box of the surface's triangles.
    pub bounds: Aabb3,
    /// Numerical tolerance inherited from the owning volume.
    pub bump: f64,
}
