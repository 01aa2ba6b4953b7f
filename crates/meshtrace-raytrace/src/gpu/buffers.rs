//! GPU buffer management for ray-tracing data.
//!
//! The canonical representation stays `f64`: ray slots hold
//! double-precision origins and directions, and the device only ever
//! sees a demoted single-precision copy for conservative BVH pruning.
//! Hit slots are written by the host after the exact double-precision
//! resolve and are never touched by a shader.

use bytemuck::{Pod, Zeroable};
use meshtrace_gpu::GpuContext;
use meshtrace_math::Aabb3;
use meshtrace_mesh::{MeshId, ID_NONE};

use crate::tree::SurfaceTree;

/// Point-in-volume result codes carried in hit slots.
pub mod piv {
    /// The query did not classify the point.
    pub const UNKNOWN: i32 = -1;
    /// The point is outside the target volume.
    pub const OUTSIDE: i32 = 0;
    /// The point is inside the target volume.
    pub const INSIDE: i32 = 1;
}

/// One device-resident ray slot.
///
/// This layout is the contract of the external-population hook: caller
/// kernels write slots of exactly this shape. `exclude_start` and
/// `exclude_count` select a range of the shared exclusion buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DblRay {
    /// Ray origin (double precision).
    pub origin: [f64; 3],
    /// Ray direction (double precision, used as given).
    pub direction: [f64; 3],
    /// Volume the ray is traced against (informational; a prepared fire
    /// traces every slot against the tree passed to it).
    pub volume_id: MeshId,
    /// Nonzero when the slot should be traced.
    pub enabled: u32,
    /// First entry of this ray's exclusion range.
    pub exclude_start: u32,
    /// Number of excluded primitive ids.
    pub exclude_count: u32,
}

/// One device-resident hit slot, paired one-to-one with a ray slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DblHit {
    /// Distance to the accepted hit, `INFTY` on a miss.
    pub distance: f64,
    /// Surface id of the accepted hit, `ID_NONE` on a miss.
    pub surf_id: MeshId,
    /// Primitive (triangle) id of the accepted hit, `ID_NONE` on a miss.
    pub primitive_id: MeshId,
    /// Point-in-volume classification (see [`piv`]).
    pub piv: i32,
    _pad: u32,
}

impl DblHit {
    /// The miss value.
    pub fn miss() -> Self {
        Self {
            distance: crate::INFTY,
            surf_id: ID_NONE,
            primitive_id: ID_NONE,
            piv: piv::UNKNOWN,
            _pad: 0,
        }
    }

    /// A hit at `distance` on `surf_id`/`primitive_id`.
    pub fn new(distance: f64, surf_id: MeshId, primitive_id: MeshId) -> Self {
        Self {
            distance,
            surf_id,
            primitive_id,
            piv: piv::UNKNOWN,
            _pad: 0,
        }
    }
}

/// GPU-compatible BVH node.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuBvhNode {
    /// AABB min.
    pub aabb_min: [f32; 4],
    /// AABB max.
    pub aabb_max: [f32; 4],
    /// For leaves: start index in the leaf-primitive list. For internal
    /// nodes: left child index.
    pub left_or_first: u32,
    /// For leaves: primitive count. For internal nodes: right child
    /// index.
    pub right_or_count: u32,
    /// Is this a leaf node? (0 = internal, 1 = leaf)
    pub is_leaf: u32,
    /// Padding.
    pub _pad: u32,
}

/// GPU-compatible primitive bounding box, pre-inflated by the volume
/// bump so the single-precision test stays conservative.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuAabb {
    /// AABB min.
    pub min: [f32; 4],
    /// AABB max.
    pub max: [f32; 4],
}

/// One pruning candidate produced by the trace kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuCandidate {
    /// Primitive ordinal within the traced tree.
    pub prim: u32,
    /// Conservative entry distance of the ray into the primitive's box.
    pub t: f32,
}

/// Push-constant style parameter block of one trace dispatch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TraceParams {
    /// Number of ray slots in this dispatch.
    pub num_rays: u32,
    /// Candidate slots reserved per ray.
    pub slots: u32,
    /// Lower edge of the conservative search window.
    pub t_min: f32,
    /// Upper edge of the conservative search window.
    pub t_max: f32,
    /// Number of BVH nodes bound.
    pub num_nodes: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 3],
}

fn cast_aabb(aabb: &Aabb3, inflate: f64) -> ([f32; 4], [f32; 4]) {
    let mut inflated = *aabb;
    inflated.expand(inflate);
    (
        [
            inflated.min.x as f32,
            inflated.min.y as f32,
            inflated.min.z as f32,
            0.0,
        ],
        [
            inflated.max.x as f32,
            inflated.max.y as f32,
            inflated.max.z as f32,
            0.0,
        ],
    )
}

/// Device-resident copy of one surface tree: the flattened BVH plus
/// per-triangle bounds, both inflated by the volume bump. The exact
/// double-precision vertex stream stays host-side in the source tree.
pub struct DeviceTree {
    /// Flattened BVH node buffer.
    pub nodes: wgpu::Buffer,
    /// Primitive ordinals in leaf order.
    pub leaf_prims: wgpu::Buffer,
    /// Inflated per-primitive bounds, indexed by ordinal.
    pub prim_aabbs: wgpu::Buffer,
    /// Number of flattened nodes (zero for an empty tree).
    pub num_nodes: usize,
}

impl DeviceTree {
    /// Upload a surface tree's acceleration data.
    pub fn upload(ctx: &GpuContext, tree: &SurfaceTree) -> Self {
        use wgpu::util::DeviceExt;

        let bump = tree.bump();
        let (flat_nodes, leaf_order) = tree.bvh().flatten();

        let mut nodes = Vec::with_capacity(flat_nodes.len().max(1));
        for (aabb, is_leaf, left_or_first, right_or_count) in &flat_nodes {
            let (aabb_min, aabb_max) = cast_aabb(aabb, bump);
            nodes.push(GpuBvhNode {
                aabb_min,
                aabb_max,
                left_or_first: *left_or_first,
                right_or_count: *right_or_count,
                is_leaf: *is_leaf as u32,
                _pad: 0,
            });
        }
        if nodes.is_empty() {
            // avoid zero-size buffers; num_nodes stays 0 so the kernel
            // never reads the dummy
            nodes.push(GpuBvhNode::zeroed());
        }

        let mut leaf_prims = leaf_order;
        if leaf_prims.is_empty() {
            leaf_prims.push(0);
        }

        let mut prim_aabbs: Vec<GpuAabb> = tree
            .triangles()
            .iter()
            .map(|tri| {
                let aabb = crate::intersect::triangle_aabb(&tri.verts);
                let (min, max) = cast_aabb(&aabb, bump);
                GpuAabb { min, max }
            })
            .collect();
        if prim_aabbs.is_empty() {
            prim_aabbs.push(GpuAabb::zeroed());
        }

        let nodes_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Surface Tree Nodes"),
                contents: bytemuck::cast_slice(&nodes),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let leaf_prims_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Surface Tree Leaf Primitives"),
                contents: bytemuck::cast_slice(&leaf_prims),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let prim_aabbs_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Surface Tree Primitive Bounds"),
                contents: bytemuck::cast_slice(&prim_aabbs),
                usage: wgpu::BufferUsages::STORAGE,
            });

        Self {
            nodes: nodes_buffer,
            leaf_prims: leaf_prims_buffer,
            prim_aabbs: prim_aabbs_buffer,
            num_nodes: flat_nodes.len(),
        }
    }
}

/// The backend's persistent device ray/hit buffers.
///
/// Grown on demand and never shrunk. The ray and hit layouts are the
/// [`DblRay`] / [`DblHit`] structs; the stride fields restate their
/// sizes for callers that write slots from their own kernels.
pub struct DeviceRayHitBuffers {
    /// Ray slots ([`DblRay`] layout).
    pub rays: wgpu::Buffer,
    /// Hit slots ([`DblHit`] layout), one per ray slot.
    pub hits: wgpu::Buffer,
    /// Shared flattened exclusion-id buffer referenced by ray slots.
    pub exclude: wgpu::Buffer,
    /// Number of ray/hit slots allocated.
    pub capacity: usize,
    /// Byte stride of one ray slot.
    pub ray_stride: usize,
    /// Byte stride of one hit slot.
    pub hit_stride: usize,

    pub(crate) candidates: wgpu::Buffer,
    pub(crate) counts: wgpu::Buffer,
    pub(crate) exclude_capacity: usize,
    pub(crate) candidate_slots: usize,
}

impl DeviceRayHitBuffers {
    /// Allocate buffers for `capacity` ray slots.
    pub(crate) fn allocate(ctx: &GpuContext, capacity: usize, candidate_slots: usize) -> Self {
        let capacity = capacity.max(1);
        let exclude_capacity = capacity * 4;

        let rays = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ray Slots"),
            size: (capacity * std::mem::size_of::<DblRay>()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let hits = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Hit Slots"),
            size: (capacity * std::mem::size_of::<DblHit>()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let exclude = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Exclusion Ids"),
            size: (exclude_capacity * std::mem::size_of::<MeshId>()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let candidates = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Candidates"),
            size: (capacity * candidate_slots * std::mem::size_of::<GpuCandidate>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let counts = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Candidate Counts"),
            size: (capacity * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Self {
            rays,
            hits,
            exclude,
            capacity,
            ray_stride: std::mem::size_of::<DblRay>(),
            hit_stride: std::mem::size_of::<DblHit>(),
            candidates,
            counts,
            exclude_capacity,
            candidate_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_layouts_are_stable() {
        // caller kernels write these layouts; the sizes are part of the
        // external-population contract
        assert_eq!(std::mem::size_of::<DblRay>(), 64);
        assert_eq!(std::mem::size_of::<DblHit>(), 24);
        assert_eq!(std::mem::size_of::<GpuBvhNode>(), 48);
        assert_eq!(std::mem::size_of::<GpuCandidate>(), 8);
        assert_eq!(std::mem::size_of::<TraceParams>(), 32);
    }

    #[test]
    fn test_miss_hit_slot() {
        let miss = DblHit::miss();
        assert_eq!(miss.distance, crate::INFTY);
        assert_eq!(miss.surf_id, ID_NONE);
        assert_eq!(miss.piv, piv::UNKNOWN);
    }
}
