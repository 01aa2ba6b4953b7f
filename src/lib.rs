//! meshtrace — double-precision ray tracing for mesh-based physics
//! codes.
//!
//! Watertight volumes bounded by triangulated surfaces, one query
//! contract, swappable backends: a host BVH tracer and a wgpu compute
//! tracer (behind the `gpu` feature). Mesh databases plug in through
//! the [`MeshManager`] trait; the kernel copies what it needs into its
//! own acceleration structures at registration time.
//!
//! # Example
//!
//! ```
//! use meshtrace::{create_ray_tracer, HitOrientation, RtLibrary, INFTY};
//! use meshtrace::mock::MeshMock;
//! use meshtrace::{Direction, Position};
//!
//! let mesh = MeshMock::new();
//! let mut tracer = create_ray_tracer(RtLibrary::Cpu).unwrap();
//! let (tree, _) = tracer.register_volume(&mesh, 0).unwrap();
//!
//! let (distance, surface) = tracer
//!     .ray_fire(
//!         tree,
//!         Position::new(0.0, 0.0, 0.0),
//!         Direction::new(1.0, 0.0, 0.0),
//!         INFTY,
//!         HitOrientation::Exiting,
//!         None,
//!     )
//!     .unwrap();
//! assert!((distance - 5.0).abs() < 1e-6);
//! assert_eq!(surface, 3);
//! ```

pub use meshtrace_math::{Aabb3, Dir3, Direction, Point3, Position, Vec3};
pub use meshtrace_mesh::{mock, MeshId, MeshManager, Sense, SurfaceElementType, ID_NONE};
pub use meshtrace_raytrace::{
    CpuRayTracer, ElementTreeId, HitOrientation, PointContainment, RayTraceError, RayTracer,
    RayTracerConfig, Result, RtLibrary, SurfaceTreeId, INFTY,
};

#[cfg(feature = "gpu")]
pub use meshtrace_raytrace::WgpuRayTracer;

/// Construct a ray tracer for the requested backend.
///
/// The wgpu backend is only available when the crate is built with the
/// `gpu` feature; requesting it otherwise reports the capability as
/// unsupported.
pub fn create_ray_tracer(library: RtLibrary) -> Result<Box<dyn RayTracer>> {
    match library {
        RtLibrary::Cpu => Ok(Box::new(CpuRayTracer::new())),
        #[cfg(feature = "gpu")]
        RtLibrary::Wgpu => Ok(Box::new(WgpuRayTracer::new())),
        #[cfg(not(feature = "gpu"))]
        RtLibrary::Wgpu => Err(RayTraceError::Unsupported {
            operation: "create_ray_tracer",
            library,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtrace_mesh::mock::MeshMock;

    #[test]
    fn test_factory_cpu() {
        let mut tracer = create_ray_tracer(RtLibrary::Cpu).unwrap();
        assert_eq!(tracer.library(), RtLibrary::Cpu);
        tracer.init().unwrap();
    }

    #[test]
    fn test_factory_round_trip_query() {
        let mesh = MeshMock::new();
        let mut tracer = create_ray_tracer(RtLibrary::Cpu).unwrap();
        tracer.register_all_volumes(&mesh).unwrap();
        let tree = tracer.surface_tree_for_volume(0).unwrap();
        assert!(tracer
            .point_in_volume(tree, Position::new(0.0, 0.0, 0.0), None, None)
            .unwrap());
    }
}
