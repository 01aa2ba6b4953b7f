//! Exact double-precision primitive tests.
//!
//! Every candidate produced by an acceleration structure — host or
//! device — is decided by these tests; no single-precision result ever
//! reaches a query answer.

mod tet;
mod triangle;

pub use tet::{point_in_tet, tet_aabb};
pub use triangle::{closest_point_triangle, facet_normal, intersect_triangle, triangle_aabb};
