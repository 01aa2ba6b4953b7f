#![warn(missing_docs)]

//! Mesh-manager contract consumed by the meshtrace ray-tracing kernel.
//!
//! The kernel never reads mesh files itself. An adapter over a mesh
//! database implements [`MeshManager`]; the tree builders pull volumes,
//! bounding surfaces, triangle coordinates, and (optionally) tetrahedral
//! elements through this trait and copy what they need into their own
//! acceleration structures.
//!
//! [`mock`] provides small in-crate meshes used by the kernel's tests.

use meshtrace_math::{Aabb3, Point3};

pub mod mock;

/// Mesh-scoped entity identifier.
pub type MeshId = i32;

/// Identifier for "no entity".
pub const ID_NONE: MeshId = -1;

/// Orientation of a surface with respect to one of its adjacent volumes.
///
/// `Forward` when the surface's facet normals point out of that volume,
/// `Reverse` when they point into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// Facet normals point out of the volume.
    Forward,
    /// Facet normals point into the volume.
    Reverse,
}

impl Sense {
    /// The orientation sign: +1 for forward, -1 for reverse.
    pub fn sign(self) -> f64 {
        match self {
            Sense::Forward => 1.0,
            Sense::Reverse => -1.0,
        }
    }
}

/// Element type of a surface's facets.
///
/// The kernel only traces triangulated surfaces; adapters over meshes
/// with quad facets are expected to split them before registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceElementType {
    /// Linear three-vertex triangles.
    Tri,
}

/// Read-only view of a mesh database.
///
/// Volumes are closed, watertight regions bounded by oriented
/// triangulated surfaces. A surface separates at most two volumes; its
/// facet normals point from the forward volume into the reverse volume.
pub trait MeshManager {
    /// All volume ids in the mesh.
    fn volumes(&self) -> Vec<MeshId>;

    /// All surface ids in the mesh.
    fn surfaces(&self) -> Vec<MeshId>;

    /// Number of volumes.
    fn num_volumes(&self) -> usize {
        self.volumes().len()
    }

    /// Number of surfaces.
    fn num_surfaces(&self) -> usize {
        self.surfaces().len()
    }

    /// The surfaces bounding `volume`.
    fn get_volume_surfaces(&self, volume: MeshId) -> Vec<MeshId>;

    /// The (forward, reverse) volume ids of `surface`.
    ///
    /// Either entry may be [`ID_NONE`] when the surface bounds the
    /// exterior on that side.
    fn surface_senses(&self, surface: MeshId) -> (MeshId, MeshId);

    /// The orientation of `surface` with respect to `volume`.
    fn surface_sense(&self, surface: MeshId, volume: MeshId) -> Sense {
        let (forward, _) = self.surface_senses(surface);
        if forward == volume {
            Sense::Forward
        } else {
            Sense::Reverse
        }
    }

    /// Ids of the triangular faces of `surface`.
    fn get_surface_faces(&self, surface: MeshId) -> Vec<MeshId>;

    /// Number of triangular faces of `surface`.
    fn num_surface_faces(&self, surface: MeshId) -> usize {
        self.get_surface_faces(surface).len()
    }

    /// The vertex coordinates of `surface`, deduplicated.
    fn get_surface_vertices(&self, surface: MeshId) -> Vec<Point3>;

    /// Triangle connectivity of `surface` as flattened 3-tuples of
    /// indices into [`MeshManager::get_surface_vertices`].
    fn get_surface_connectivity(&self, surface: MeshId) -> Vec<usize>;

    /// Facet element type of `surface`.
    fn get_surface_element_type(&self, _surface: MeshId) -> SurfaceElementType {
        SurfaceElementType::Tri
    }

    /// Vertex coordinates of one triangle, in winding order.
    fn triangle_vertices(&self, face: MeshId) -> [Point3; 3];

    /// Ids of the tetrahedral elements of `volume`.
    ///
    /// Empty for surface-only meshes; the kernel then skips building an
    /// element tree for that volume.
    fn get_volume_elements(&self, _volume: MeshId) -> Vec<MeshId> {
        Vec::new()
    }

    /// Number of tetrahedral elements of `volume`.
    fn num_volume_elements(&self, volume: MeshId) -> usize {
        self.get_volume_elements(volume).len()
    }

    /// Vertex coordinates of one tetrahedron.
    fn tet_vertices(&self, element: MeshId) -> [Point3; 4];

    /// Axis-aligned bounding box of `volume`.
    fn bounding_box(&self, volume: MeshId) -> Aabb3;
}
