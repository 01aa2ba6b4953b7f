#![warn(missing_docs)]

//! Double-precision ray-tracing core for unstructured-mesh geometry
//! queries.
//!
//! Given volumes bounded by triangulated surfaces (pulled through the
//! [`meshtrace_mesh::MeshManager`] contract), this crate answers the
//! geometric queries transport and shielding codes ask in their inner
//! loop: distance to the bounding surface along a direction
//! (`ray_fire`), point containment, nearest surface point, occlusion,
//! and tetrahedral point location.
//!
//! # Architecture
//!
//! - [`bvh`] - SAH bounding-volume hierarchy over primitive boxes
//! - [`tree`] - registry owning per-volume and global trees
//! - [`filter`] - per-hit orientation/exclusion/precision policy
//! - [`backend`] - the [`RayTracer`] contract both backends implement
//! - [`cpu`] - host traversal backend
//! - [`gpu`] - wgpu compute backend (feature `gpu`): single-precision
//!   candidate pruning on the device, exact double-precision resolve on
//!   the host
//!
//! # Example
//!
//! ```
//! use meshtrace_mesh::mock::MeshMock;
//! use meshtrace_raytrace::{CpuRayTracer, HitOrientation, RayTracer, INFTY};
//! use meshtrace_math::{Position, Direction};
//!
//! let mesh = MeshMock::new();
//! let mut tracer = CpuRayTracer::new();
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

pub mod backend;
pub mod bvh;
pub mod config;
pub mod cpu;
pub mod error;
pub mod filter;
pub mod geometry_data;
pub mod intersect;
pub mod primitive_ref;
mod query;
mod ray;
pub mod tree;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use backend::{RayTracer, RtLibrary};
pub use config::RayTracerConfig;
pub use cpu::CpuRayTracer;
pub use error::{RayTraceError, Result};
pub use filter::{HitOrientation, PointContainment};
pub use geometry_data::GeometryUserData;
pub use primitive_ref::PrimitiveRef;
pub use ray::Ray;
pub use tree::{ElementTreeId, SurfaceTreeId, TreeRegistry};

#[cfg(feature = "gpu")]
pub use backend::RayPopulationCallback;
#[cfg(feature = "gpu")]
pub use gpu::WgpuRayTracer;

/// Distance reported when a query finds no hit.
pub const INFTY: f64 = f64::INFINITY;
