//! The backend-agnostic ray-tracer contract.
//!
//! One trait exposes every registration and query operation; the CPU
//! and GPU backends plug in behind it. Backend-specific operations
//! (device ray buffers, prepared fires) carry default implementations
//! that report the capability as unsupported, so a caller holding a
//! `dyn RayTracer` gets a uniform error rather than a missing method.

use std::fmt;

use meshtrace_math::{Direction, Position};
use meshtrace_mesh::{MeshId, MeshManager};

use crate::config::RayTracerConfig;
#[cfg(feature = "gpu")]
use crate::error::RayTraceError;
use crate::error::Result;
use crate::filter::HitOrientation;
use crate::tree::{ElementTreeId, SurfaceTreeId};

#[cfg(feature = "gpu")]
use crate::gpu::buffers::{DblHit, DeviceRayHitBuffers};

/// Identity of a ray-tracing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtLibrary {
    /// Host BVH traversal; batched queries fan out over a thread pool.
    Cpu,
    /// wgpu compute backend with device-resident ray and hit buffers.
    Wgpu,
}

impl fmt::Display for RtLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtLibrary::Cpu => write!(f, "CPU"),
            RtLibrary::Wgpu => write!(f, "wgpu"),
        }
    }
}

/// Callback that fills device ray slots through caller-owned kernels.
///
/// Receives the backend's buffer descriptor and the number of slots to
/// populate; the core never reads the slots back from the host side
/// except to resolve candidates in double precision.
#[cfg(feature = "gpu")]
pub type RayPopulationCallback<'a> = &'a mut dyn FnMut(&DeviceRayHitBuffers, usize);

/// The ray-tracing contract shared by every backend.
///
/// Registration operations mutate the tree registry and therefore take
/// `&mut self`; scalar queries are read-only and may run concurrently
/// from multiple threads. Batched queries take `&mut self` because GPU
/// backends stage them through shared device buffers.
pub trait RayTracer {
    /// Which backend this is.
    fn library(&self) -> RtLibrary;

    /// Acquire backend resources. Idempotent.
    fn init(&mut self) -> Result<()>;

    /// The numerical configuration in effect.
    fn config(&self) -> &RayTracerConfig;

    // --- registration -----------------------------------------------------

    /// Build the surface tree and (when the volume carries tetrahedra)
    /// the element tree of `volume`.
    fn register_volume(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<(SurfaceTreeId, Option<ElementTreeId>)>;

    /// Register every volume of the mesh.
    fn register_all_volumes(&mut self, mesh: &dyn MeshManager) -> Result<()> {
        for volume in mesh.volumes() {
            self.register_volume(mesh, volume)?;
        }
        Ok(())
    }

    /// Build only the surface tree of `volume`.
    fn create_surface_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<SurfaceTreeId>;

    /// Build only the element tree of `volume`; `None` when the volume
    /// has no tetrahedra (or the backend does not index elements).
    fn create_element_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<Option<ElementTreeId>>;

    /// Build one tree over the union of all surfaces, for whole-model
    /// queries.
    fn create_global_surface_tree(&mut self, mesh: &dyn MeshManager) -> Result<SurfaceTreeId>;

    /// Build one tree over the tetrahedra of every volume.
    ///
    /// Backends without element support log a warning and return `None`.
    fn create_global_element_tree(
        &mut self,
        mesh: &dyn MeshManager,
    ) -> Result<Option<ElementTreeId>>;

    /// Number of surface trees issued by this tracer.
    fn num_surface_trees(&self) -> usize;

    /// Number of element trees issued by this tracer.
    fn num_element_trees(&self) -> usize;

    /// The surface tree registered for `volume`, if any.
    fn surface_tree_for_volume(&self, volume: MeshId) -> Option<SurfaceTreeId>;

    /// The element tree registered for `volume`, if any.
    fn element_tree_for_volume(&self, volume: MeshId) -> Option<ElementTreeId>;

    // --- scalar queries ---------------------------------------------------

    /// Fire a ray at the volume behind `tree`.
    ///
    /// Returns the distance to the nearest filter-accepting surface hit
    /// within `[bump, dist_limit]` and the hit surface's mesh id, or
    /// `(INFTY, ID_NONE)` on a miss. When `exclude` is provided, its
    /// primitives are skipped and the winning primitive id is appended
    /// to it so an immediate re-fire continues past the hit.
    fn ray_fire(
        &self,
        tree: SurfaceTreeId,
        origin: Position,
        direction: Direction,
        dist_limit: f64,
        orientation: HitOrientation,
        exclude: Option<&mut Vec<MeshId>>,
    ) -> Result<(f64, MeshId)>;

    /// Whether `point` lies inside the volume behind `tree`.
    ///
    /// Classified by the orientation of the nearest surface crossing
    /// along `direction` (or a stable default direction). A point
    /// sitting on the boundary is classified by the supplied direction;
    /// an unclassifiable on-boundary point reports outside.
    fn point_in_volume(
        &self,
        tree: SurfaceTreeId,
        point: Position,
        direction: Option<Direction>,
        exclude: Option<&mut Vec<MeshId>>,
    ) -> Result<bool>;

    /// Distance from `origin` to the nearest point on any surface of
    /// `tree`, with the nearest triangle's mesh id.
    fn closest(&self, tree: SurfaceTreeId, origin: Position) -> Result<(f64, MeshId)>;

    /// Whether anything blocks `origin + t*direction` for
    /// `t in [bump, dist_limit]`. Early-exits on the first accepted hit.
    fn occluded(
        &self,
        tree: SurfaceTreeId,
        origin: Position,
        direction: Direction,
        dist_limit: f64,
    ) -> Result<bool>;

    /// The tetrahedron of `tree` containing `point`, or `ID_NONE`.
    fn find_element(&self, tree: ElementTreeId, point: Position) -> Result<MeshId>;

    // --- batched queries --------------------------------------------------

    /// Elementwise [`RayTracer::ray_fire`] over ray slots.
    fn ray_fire_batch(
        &mut self,
        tree: SurfaceTreeId,
        rays: &[(Position, Direction)],
        dist_limit: f64,
        orientation: HitOrientation,
    ) -> Result<Vec<(f64, MeshId)>> {
        rays.iter()
            .map(|(origin, direction)| {
                self.ray_fire(tree, *origin, *direction, dist_limit, orientation, None)
            })
            .collect()
    }

    /// Elementwise [`RayTracer::point_in_volume`].
    fn point_in_volume_batch(
        &mut self,
        tree: SurfaceTreeId,
        points: &[Position],
    ) -> Result<Vec<bool>> {
        points
            .iter()
            .map(|point| self.point_in_volume(tree, *point, None, None))
            .collect()
    }

    /// Elementwise [`RayTracer::closest`].
    fn closest_batch(
        &mut self,
        tree: SurfaceTreeId,
        origins: &[Position],
    ) -> Result<Vec<(f64, MeshId)>> {
        origins
            .iter()
            .map(|origin| self.closest(tree, *origin))
            .collect()
    }

    /// Elementwise [`RayTracer::occluded`].
    fn occluded_batch(
        &mut self,
        tree: SurfaceTreeId,
        rays: &[(Position, Direction)],
        dist_limit: f64,
    ) -> Result<Vec<bool>> {
        rays.iter()
            .map(|(origin, direction)| self.occluded(tree, *origin, *direction, dist_limit))
            .collect()
    }

    /// Elementwise [`RayTracer::find_element`].
    fn find_element_batch(
        &mut self,
        tree: ElementTreeId,
        points: &[Position],
    ) -> Result<Vec<MeshId>> {
        points
            .iter()
            .map(|point| self.find_element(tree, *point))
            .collect()
    }

    // --- device buffer pipeline (GPU backends) ----------------------------

    /// Let the caller populate device ray slots with its own kernels.
    ///
    /// The backend sizes its persistent ray/hit buffers for `num_rays`
    /// slots, then invokes `callback` with the buffer descriptor.
    #[cfg(feature = "gpu")]
    fn populate_rays_external(
        &mut self,
        _num_rays: usize,
        _callback: RayPopulationCallback<'_>,
    ) -> Result<()> {
        Err(RayTraceError::Unsupported {
            operation: "populate_rays_external",
            library: self.library(),
        })
    }

    /// Trace the ray slots already sitting in the device ray buffer.
    #[cfg(feature = "gpu")]
    fn ray_fire_prepared(
        &mut self,
        _tree: SurfaceTreeId,
        _num_rays: usize,
        _dist_limit: f64,
        _orientation: HitOrientation,
    ) -> Result<()> {
        Err(RayTraceError::Unsupported {
            operation: "ray_fire_prepared",
            library: self.library(),
        })
    }

    /// Copy the hit slots of the last prepared fire back to the host.
    #[cfg(feature = "gpu")]
    fn transfer_hits_to_host(&mut self, _num_rays: usize) -> Result<Vec<DblHit>> {
        Err(RayTraceError::Unsupported {
            operation: "transfer_hits_to_host",
            library: self.library(),
        })
    }

    /// The backend's persistent device ray/hit buffers.
    #[cfg(feature = "gpu")]
    fn device_buffers(&self) -> Result<&DeviceRayHitBuffers> {
        Err(RayTraceError::Unsupported {
            operation: "device_buffers",
            library: self.library(),
        })
    }
}
