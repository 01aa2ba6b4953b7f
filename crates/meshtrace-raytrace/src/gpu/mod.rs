//! GPU backend: wgpu compute pruning with host double-precision
//! resolution.
//!
//! The device never owns the answer. It traverses a single-precision
//! BVH whose boxes are inflated by the volume bump and reports a
//! conservative candidate set per ray slot; the host then runs the
//! exact double-precision triangle test and the hit filter over the
//! candidates, so batched results are elementwise identical to the
//! scalar path. Rays whose candidate set overflows its slots fall back
//! to a full host traversal.
//!
//! The backend owns persistent device ray and hit buffers, grown on
//! demand, so callers can populate ray slots with their own kernels and
//! fire without a host round-trip per batch.

pub mod buffers;
pub mod pipeline;
pub mod shaders;

use std::collections::HashMap;

use meshtrace_gpu::{GpuContext, GpuError};
use meshtrace_math::{Direction, Position};
use meshtrace_mesh::{MeshId, MeshManager};
use rayon::prelude::*;

use crate::backend::{RayPopulationCallback, RayTracer, RtLibrary};
use crate::config::RayTracerConfig;
use crate::error::{RayTraceError, Result};
use crate::filter::{HitOrientation, RayFireKind};
use crate::query;
use crate::ray::Ray;
use crate::tree::{ElementTreeId, SurfaceTree, SurfaceTreeId, TreeRegistry};

use buffers::{DblHit, DblRay, DeviceRayHitBuffers, DeviceTree, GpuCandidate, TraceParams};

/// Ray tracer staging batched queries through wgpu compute.
///
/// Scalar queries run on the host trees; batched ray fires are pruned
/// on the device. Element trees are not built by this backend.
pub struct WgpuRayTracer {
    registry: TreeRegistry,
    config: RayTracerConfig,
    context: Option<GpuContext>,
    pipeline: Option<pipeline::TracePipeline>,
    device_trees: HashMap<u32, DeviceTree>,
    buffers: Option<DeviceRayHitBuffers>,
    last_hits: Vec<DblHit>,
}

impl WgpuRayTracer {
    /// Create a wgpu ray tracer with default numerical settings.
    ///
    /// No device is acquired until [`RayTracer::init`] (or the first
    /// batched query).
    pub fn new() -> Self {
        Self::with_config(RayTracerConfig::default())
    }

    /// Create a wgpu ray tracer with explicit numerical settings.
    pub fn with_config(config: RayTracerConfig) -> Self {
        Self {
            registry: TreeRegistry::new(),
            config,
            context: None,
            pipeline: None,
            device_trees: HashMap::new(),
            buffers: None,
            last_hits: Vec::new(),
        }
    }

    /// The device context, once acquired.
    ///
    /// Callers populating ray slots with their own kernels submit work
    /// through this context's queue.
    pub fn context(&self) -> Option<&GpuContext> {
        self.context.as_ref()
    }

    /// The tree registry owned by this tracer.
    pub fn registry(&self) -> &TreeRegistry {
        &self.registry
    }

    fn ensure_context(&mut self) -> Result<()> {
        if self.context.is_none() {
            let context = GpuContext::new_blocking()?;
            self.pipeline = Some(pipeline::TracePipeline::new(&context)?);
            self.context = Some(context);
        }
        Ok(())
    }

    fn ctx(&self) -> Result<&GpuContext> {
        self.context.as_ref().ok_or(GpuError::NotInitialized.into())
    }

    fn ensure_device_tree(&mut self, id: SurfaceTreeId) -> Result<()> {
        if self.device_trees.contains_key(&id.0) {
            return Ok(());
        }
        let tree = self.registry.surface_tree(id)?;
        let ctx = self
            .context
            .as_ref()
            .ok_or::<RayTraceError>(GpuError::NotInitialized.into())?;
        let device_tree = DeviceTree::upload(ctx, tree);
        self.device_trees.insert(id.0, device_tree);
        Ok(())
    }

    /// Grow the persistent ray/hit buffers to hold `num_rays` slots.
    /// Buffers never shrink.
    pub fn check_buffer_capacity(&mut self, num_rays: usize) -> Result<()> {
        self.ensure_context()?;
        let needs_grow = match &self.buffers {
            Some(buffers) => buffers.capacity < num_rays,
            None => true,
        };
        if needs_grow {
            let buffers = {
                let ctx = self.ctx()?;
                DeviceRayHitBuffers::allocate(ctx, num_rays, self.config.gpu_candidate_slots)
            };
            self.buffers = Some(buffers);
        }
        Ok(())
    }

    fn buffers_ref(&self) -> Result<&DeviceRayHitBuffers> {
        self.buffers
            .as_ref()
            .ok_or(GpuError::NotInitialized.into())
    }

    /// Dispatch the pruning kernel over `num_rays` slots and read the
    /// candidate sets back.
    fn trace_candidates(
        &self,
        tree: SurfaceTreeId,
        num_rays: usize,
        dist_limit: f64,
    ) -> Result<(Vec<u32>, Vec<GpuCandidate>)> {
        let ctx = self.ctx()?;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or::<RayTraceError>(GpuError::NotInitialized.into())?;
        let device_tree = self
            .device_trees
            .get(&tree.0)
            .ok_or::<RayTraceError>(GpuError::NotInitialized.into())?;
        let buffers = self.buffers_ref()?;
        let host_tree = self.registry.surface_tree(tree)?;

        let bump = host_tree.bump();
        // widen the window so single-precision roundoff cannot prune a
        // true hit at the edge
        let t_max = if dist_limit >= f32::MAX as f64 {
            f32::INFINITY
        } else {
            (dist_limit * 1.0001 + bump) as f32
        };
        let params = TraceParams {
            num_rays: num_rays as u32,
            slots: buffers.candidate_slots as u32,
            t_min: (-2.0 * bump) as f32,
            t_max,
            num_nodes: device_tree.num_nodes as u32,
            _pad: [0; 3],
        };

        pipeline.dispatch(ctx, device_tree, buffers, &params, num_rays)?;

        let counts = pipeline::read_buffer_as::<u32>(ctx, &buffers.counts, num_rays)?;
        let candidates = pipeline::read_buffer_as::<GpuCandidate>(
            ctx,
            &buffers.candidates,
            num_rays * buffers.candidate_slots,
        )?;
        Ok((counts, candidates))
    }

    /// Resolve candidate sets to hit slots through the exact host path
    /// and mirror them into the device hit buffer.
    fn resolve_and_store(
        &mut self,
        tree: SurfaceTreeId,
        rays: &[DblRay],
        counts: &[u32],
        candidates: &[GpuCandidate],
        exclude_pool: &[MeshId],
        dist_limit: f64,
        orientation: HitOrientation,
    ) -> Result<()> {
        let host_tree = self.registry.surface_tree(tree)?;
        let slots = self
            .buffers_ref()?
            .candidate_slots;

        let hits = resolve_hits(
            host_tree,
            &self.config,
            rays,
            counts,
            candidates,
            slots,
            exclude_pool,
            dist_limit,
            orientation,
        );

        let ctx = self.ctx()?;
        let buffers = self.buffers_ref()?;
        ctx.queue
            .write_buffer(&buffers.hits, 0, bytemuck::cast_slice(&hits));
        self.last_hits = hits;
        Ok(())
    }
}

impl Default for WgpuRayTracer {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every ray slot through the double-precision accept path.
#[allow(clippy::too_many_arguments)]
fn resolve_hits(
    tree: &SurfaceTree,
    config: &RayTracerConfig,
    rays: &[DblRay],
    counts: &[u32],
    candidates: &[GpuCandidate],
    slots: usize,
    exclude_pool: &[MeshId],
    dist_limit: f64,
    orientation: HitOrientation,
) -> Vec<DblHit> {
    rays.par_iter()
        .enumerate()
        .map(|(i, slot)| {
            if slot.enabled == 0 {
                return DblHit::miss();
            }

            let origin = Position::new(slot.origin[0], slot.origin[1], slot.origin[2]);
            let direction =
                Direction::new(slot.direction[0], slot.direction[1], slot.direction[2]);
            let ray = Ray::new(origin, direction);

            let exclude = if slot.exclude_count > 0 {
                let start = slot.exclude_start as usize;
                exclude_pool.get(start..start + slot.exclude_count as usize)
            } else {
                None
            };

            let count = counts[i] as usize;
            let (hit, _) = if count > slots {
                // candidate overflow: fall back to the full host tree
                tree.nearest_hit(
                    &ray,
                    dist_limit,
                    orientation,
                    RayFireKind::Volume,
                    exclude,
                    config,
                )
            } else {
                let base = i * slots;
                let ordinals: Vec<u32> = candidates[base..base + count]
                    .iter()
                    .map(|c| c.prim)
                    .collect();
                tree.nearest_hit_among(
                    &ray,
                    &ordinals,
                    dist_limit,
                    orientation,
                    RayFireKind::Volume,
                    exclude,
                    config,
                )
            };

            match hit {
                Some(hit) => DblHit::new(
                    hit.t,
                    tree.surface_of(hit.ordinal).surface_id,
                    tree.primitive_refs()[hit.ordinal as usize].primitive_id,
                ),
                None => DblHit::miss(),
            }
        })
        .collect()
}

impl RayTracer for WgpuRayTracer {
    fn library(&self) -> RtLibrary {
        RtLibrary::Wgpu
    }

    fn init(&mut self) -> Result<()> {
        self.ensure_context()
    }

    fn config(&self) -> &RayTracerConfig {
        &self.config
    }

    fn register_volume(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<(SurfaceTreeId, Option<ElementTreeId>)> {
        let surface_tree = self.create_surface_tree(mesh, volume)?;
        let element_tree = self.create_element_tree(mesh, volume)?;
        Ok((surface_tree, element_tree))
    }

    fn create_surface_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<SurfaceTreeId> {
        // host tree first (it is also the exact-resolve side); the
        // device copy uploads lazily on first batched use
        self.registry.create_surface_tree(mesh, volume, &self.config)
    }

    fn create_element_tree(
        &mut self,
        _mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<Option<ElementTreeId>> {
        log::warn!("element trees are not supported by the wgpu backend (volume {volume})");
        Ok(None)
    }

    fn create_global_surface_tree(&mut self, mesh: &dyn MeshManager) -> Result<SurfaceTreeId> {
        self.registry.create_global_surface_tree(mesh, &self.config)
    }

    fn create_global_element_tree(
        &mut self,
        _mesh: &dyn MeshManager,
    ) -> Result<Option<ElementTreeId>> {
        log::warn!("global element trees are not supported by the wgpu backend");
        Ok(None)
    }

    fn num_surface_trees(&self) -> usize {
        self.registry.num_surface_trees()
    }

    fn num_element_trees(&self) -> usize {
        self.registry.num_element_trees()
    }

    fn surface_tree_for_volume(&self, volume: MeshId) -> Option<SurfaceTreeId> {
        self.registry.surface_tree_for_volume(volume)
    }

    fn element_tree_for_volume(&self, volume: MeshId) -> Option<ElementTreeId> {
        self.registry.element_tree_for_volume(volume)
    }

    fn ray_fire(
        &self,
        tree: SurfaceTreeId,
        origin: Position,
        direction: Direction,
        dist_limit: f64,
        orientation: HitOrientation,
        exclude: Option<&mut Vec<MeshId>>,
    ) -> Result<(f64, MeshId)> {
        query::ray_fire(
            &self.registry,
            &self.config,
            tree,
            origin,
            direction,
            dist_limit,
            orientation,
            exclude,
        )
    }

    fn point_in_volume(
        &self,
        tree: SurfaceTreeId,
        point: Position,
        direction: Option<Direction>,
        exclude: Option<&mut Vec<MeshId>>,
    ) -> Result<bool> {
        query::point_in_volume(&self.registry, &self.config, tree, point, direction, exclude)
    }

    fn closest(&self, tree: SurfaceTreeId, origin: Position) -> Result<(f64, MeshId)> {
        query::closest(&self.registry, tree, origin)
    }

    fn occluded(
        &self,
        tree: SurfaceTreeId,
        origin: Position,
        direction: Direction,
        dist_limit: f64,
    ) -> Result<bool> {
        query::occluded(&self.registry, &self.config, tree, origin, direction, dist_limit)
    }

    fn find_element(&self, tree: ElementTreeId, point: Position) -> Result<MeshId> {
        query::find_element(&self.registry, tree, point)
    }

    fn ray_fire_batch(
        &mut self,
        tree: SurfaceTreeId,
        rays: &[(Position, Direction)],
        dist_limit: f64,
        orientation: HitOrientation,
    ) -> Result<Vec<(f64, MeshId)>> {
        query::check_dist_limit(dist_limit)?;
        let volume = self.registry.surface_tree(tree)?.volume();
        if rays.is_empty() {
            self.last_hits.clear();
            return Ok(Vec::new());
        }

        self.ensure_context()?;
        self.ensure_device_tree(tree)?;
        self.check_buffer_capacity(rays.len())?;

        let slots: Vec<DblRay> = rays
            .iter()
            .map(|(origin, direction)| DblRay {
                origin: [origin.x, origin.y, origin.z],
                direction: [direction.x, direction.y, direction.z],
                volume_id: volume,
                enabled: 1,
                exclude_start: 0,
                exclude_count: 0,
            })
            .collect();

        {
            let ctx = self.ctx()?;
            let buffers = self.buffers_ref()?;
            ctx.queue
                .write_buffer(&buffers.rays, 0, bytemuck::cast_slice(&slots));
        }

        let (counts, candidates) = self.trace_candidates(tree, rays.len(), dist_limit)?;
        self.resolve_and_store(tree, &slots, &counts, &candidates, &[], dist_limit, orientation)?;

        Ok(self
            .last_hits
            .iter()
            .map(|hit| (hit.distance, hit.surf_id))
            .collect())
    }

    fn populate_rays_external(
        &mut self,
        num_rays: usize,
        callback: RayPopulationCallback<'_>,
    ) -> Result<()> {
        self.check_buffer_capacity(num_rays)?;
        callback(self.buffers_ref()?, num_rays);
        Ok(())
    }

    fn ray_fire_prepared(
        &mut self,
        tree: SurfaceTreeId,
        num_rays: usize,
        dist_limit: f64,
        orientation: HitOrientation,
    ) -> Result<()> {
        query::check_dist_limit(dist_limit)?;
        self.registry.surface_tree(tree)?;
        if num_rays == 0 {
            self.last_hits.clear();
            return Ok(());
        }
        self.ensure_context()?;
        self.ensure_device_tree(tree)?;

        let buffers = self.buffers_ref()?;
        if buffers.capacity < num_rays {
            return Err(RayTraceError::InvalidArgument(format!(
                "ray buffer holds {} slots but {num_rays} were requested; \
                 populate the rays first",
                buffers.capacity
            )));
        }

        let (counts, candidates) = self.trace_candidates(tree, num_rays, dist_limit)?;

        // the slots were written on the device; bring them back for the
        // exact double-precision resolve
        let ctx = self.ctx()?;
        let buffers = self.buffers_ref()?;
        let rays: Vec<DblRay> = pipeline::read_buffer_as(ctx, &buffers.rays, num_rays)?;
        let exclude_pool: Vec<MeshId> = if rays.iter().any(|r| r.exclude_count > 0) {
            pipeline::read_buffer_as(ctx, &buffers.exclude, buffers.exclude_capacity)?
        } else {
            Vec::new()
        };

        self.resolve_and_store(
            tree,
            &rays,
            &counts,
            &candidates,
            &exclude_pool,
            dist_limit,
            orientation,
        )
    }

    fn transfer_hits_to_host(&mut self, num_rays: usize) -> Result<Vec<DblHit>> {
        if num_rays == 0 {
            return Ok(Vec::new());
        }
        let ctx = self.ctx()?;
        let buffers = self.buffers_ref()?;
        if buffers.capacity < num_rays {
            return Err(RayTraceError::InvalidArgument(format!(
                "hit buffer holds {} slots but {num_rays} were requested",
                buffers.capacity
            )));
        }
        Ok(pipeline::read_buffer_as(ctx, &buffers.hits, num_rays)?)
    }

    fn device_buffers(&self) -> Result<&DeviceRayHitBuffers> {
        self.buffers_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INFTY;
    use meshtrace_mesh::mock::MeshMock;

    #[test]
    fn test_scalar_queries_work_without_device() {
        // scalar paths run on the host trees; no adapter required
        let mm = MeshMock::new();
        let mut rt = WgpuRayTracer::new();
        let (tree, element_tree) = rt.register_volume(&mm, 0).unwrap();
        assert!(element_tree.is_none());

        let (dist, surf) = rt
            .ray_fire(
                tree,
                Position::new(0.0, 0.0, 0.0),
                Direction::new(1.0, 0.0, 0.0),
                INFTY,
                HitOrientation::Exiting,
                None,
            )
            .unwrap();
        assert!((dist - 5.0).abs() < 1e-6);
        assert_eq!(surf, 3);

        assert!(rt
            .point_in_volume(tree, Position::new(0.0, 0.0, 0.0), None, None)
            .unwrap());
    }

    #[test]
    fn test_element_trees_unsupported() {
        let mm = MeshMock::new();
        let mut rt = WgpuRayTracer::new();
        assert_eq!(rt.create_element_tree(&mm, 0).unwrap(), None);
        assert_eq!(rt.create_global_element_tree(&mm).unwrap(), None);
        assert_eq!(rt.num_element_trees(), 0);
    }

    #[test]
    fn test_device_buffers_require_population() {
        let rt = WgpuRayTracer::new();
        assert!(rt.device_buffers().is_err());
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_batched_matches_scalar_on_device() {
        let mm = MeshMock::new();
        let mut rt = WgpuRayTracer::new();
        let (tree, _) = rt.register_volume(&mm, 0).unwrap();
        rt.init().unwrap();

        let rays: Vec<(Position, Direction)> = (0..64)
            .map(|i| {
                let s = if i % 2 == 1 { 1.0 } else { -1.0 };
                let dir = match i % 3 {
                    0 => Direction::new(s, 0.0, 0.0),
                    1 => Direction::new(0.0, s, 0.0),
                    _ => Direction::new(0.0, 0.0, s),
                };
                (Position::new(0.0, 0.0, 0.0), dir)
            })
            .collect();

        let batch = rt
            .ray_fire_batch(tree, &rays, INFTY, HitOrientation::Exiting)
            .unwrap();
        for (i, (origin, direction)) in rays.iter().enumerate() {
            let scalar = rt
                .ray_fire(tree, *origin, *direction, INFTY, HitOrientation::Exiting, None)
                .unwrap();
            assert_eq!(batch[i].1, scalar.1, "ray {i}");
            assert!((batch[i].0 - scalar.0).abs() < 1e-6, "ray {i}");
        }
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_externally_populated_rays_round_trip() {
        let mm = MeshMock::new();
        let mut rt = WgpuRayTracer::new();
        let (tree, _) = rt.register_volume(&mm, 0).unwrap();
        rt.init().unwrap();

        let n = 16;
        let slots: Vec<DblRay> = (0..n)
            .map(|i| DblRay {
                origin: [0.0, 0.0, 0.0],
                direction: if i % 2 == 0 {
                    [1.0, 0.0, 0.0]
                } else {
                    [-1.0, 0.0, 0.0]
                },
                volume_id: 0,
                enabled: 1,
                exclude_start: 0,
                exclude_count: 0,
            })
            .collect();

        // the test writes through the queue; a real caller would launch
        // its own compute kernel against `buffers.rays`
        rt.populate_rays_external(n, &mut |device_buffers, num_rays| {
            assert!(device_buffers.capacity >= num_rays);
            assert_eq!(device_buffers.ray_stride, std::mem::size_of::<DblRay>());
        })
        .unwrap();
        {
            let ctx = rt.context().unwrap();
            let buffers = rt.device_buffers().unwrap();
            ctx.queue
                .write_buffer(&buffers.rays, 0, bytemuck::cast_slice(&slots));
        }

        rt.ray_fire_prepared(tree, n, INFTY, HitOrientation::Exiting)
            .unwrap();
        let hits = rt.transfer_hits_to_host(n).unwrap();
        assert_eq!(hits.len(), n);
        for (i, hit) in hits.iter().enumerate() {
            let expected = if i % 2 == 0 { 5.0 } else { 2.0 };
            assert!((hit.distance - expected).abs() < 1e-6, "slot {i}");
        }
    }
}
