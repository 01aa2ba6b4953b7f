//! CPU backend: host-side BVH traversal.
//!
//! Scalar queries walk the registry's trees directly; the batched ray
//! form fans out over a rayon thread pool, with elementwise semantics
//! identical to the scalar path.

use meshtrace_math::{Direction, Position};
use meshtrace_mesh::{MeshId, MeshManager, ID_NONE};
use rayon::prelude::*;

use crate::backend::{RayTracer, RtLibrary};
use crate::config::RayTracerConfig;
use crate::error::Result;
use crate::filter::{HitOrientation, PointContainment, RayFireKind};
use crate::query;
use crate::ray::Ray;
use crate::tree::{ElementTreeId, SurfaceTreeId, TreeRegistry};
use crate::INFTY;

/// Ray tracer executing every query on the host.
pub struct CpuRayTracer {
    registry: TreeRegistry,
    config: RayTracerConfig,
}

impl CpuRayTracer {
    /// Create a CPU ray tracer with default numerical settings.
    pub fn new() -> Self {
        Self::with_config(RayTracerConfig::default())
    }

    /// Create a CPU ray tracer with explicit numerical settings.
    pub fn with_config(config: RayTracerConfig) -> Self {
        Self {
            registry: TreeRegistry::new(),
            config,
        }
    }

    /// The tree registry owned by this tracer.
    pub fn registry(&self) -> &TreeRegistry {
        &self.registry
    }

    /// Containment with the full tri-state answer.
    ///
    /// [`RayTracer::point_in_volume`] collapses `OnBoundary` to outside;
    /// callers that need to distinguish can use this form.
    pub fn point_in_volume_state(
        &self,
        tree: SurfaceTreeId,
        point: Position,
        direction: Option<Direction>,
        exclude: Option<&mut Vec<MeshId>>,
    ) -> Result<PointContainment> {
        query::point_in_volume_state(&self.registry, &self.config, tree, point, direction, exclude)
    }
}

impl Default for CpuRayTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl RayTracer for CpuRayTracer {
    fn library(&self) -> RtLibrary {
        RtLibrary::Cpu
    }

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn config(&self) -> &RayTracerConfig {
        &self.config
    }

    fn register_volume(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<(SurfaceTreeId, Option<ElementTreeId>)> {
        self.registry.register_volume(mesh, volume, &self.config)
    }

    fn create_surface_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<SurfaceTreeId> {
        self.registry.create_surface_tree(mesh, volume, &self.config)
    }

    fn create_element_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
    ) -> Result<Option<ElementTreeId>> {
        self.registry.create_element_tree(mesh, volume, &self.config)
    }

    fn create_global_surface_tree(&mut self, mesh: &dyn MeshManager) -> Result<SurfaceTreeId> {
        self.registry.create_global_surface_tree(mesh, &self.config)
    }

    fn create_global_element_tree(
        &mut self,
        mesh: &dyn MeshManager,
    ) -> Result<Option<ElementTreeId>> {
        self.registry.create_global_element_tree(mesh, &self.config)
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
        let tree = self.registry.surface_tree(tree)?;
        let config = &self.config;

        Ok(rays
            .par_iter()
            .map(|(origin, direction)| {
                let ray = Ray::new(*origin, *direction);
                let (hit, _) = tree.nearest_hit(
                    &ray,
                    dist_limit,
                    orientation,
                    RayFireKind::Volume,
                    None,
                    config,
                );
                match hit {
                    Some(hit) => (hit.t, tree.surface_of(hit.ordinal).surface_id),
                    None => (INFTY, ID_NONE),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RayTraceError;
    use meshtrace_mesh::mock::{MeshMock, TetCubeMock};

    /// Mock-box surface ids per axis face: +z, -z, -x, +x, -y, +y.
    const SURF_POS_Z: MeshId = 0;
    const SURF_NEG_Z: MeshId = 1;
    const SURF_NEG_X: MeshId = 2;
    const SURF_POS_X: MeshId = 3;
    const SURF_NEG_Y: MeshId = 4;
    const SURF_POS_Y: MeshId = 5;

    fn tracer_with_mock() -> (CpuRayTracer, SurfaceTreeId) {
        let mm = MeshMock::new();
        let mut rt = CpuRayTracer::new();
        let (tree, element_tree) = rt.register_volume(&mm, 0).unwrap();
        assert!(element_tree.is_none());
        rt.init().unwrap();
        (rt, tree)
    }

    fn fire(
        rt: &CpuRayTracer,
        tree: SurfaceTreeId,
        origin: [f64; 3],
        direction: [f64; 3],
        orientation: HitOrientation,
    ) -> (f64, MeshId) {
        rt.ray_fire(
            tree,
            Position::new(origin[0], origin[1], origin[2]),
            Direction::new(direction[0], direction[1], direction[2]),
            INFTY,
            orientation,
            None,
        )
        .unwrap()
    }

    /// The ray pattern of the batch tests: axis-aligned fires from the
    /// origin, alternating sign.
    fn make_rays(n: usize) -> Vec<(Position, Direction)> {
        (0..n)
            .map(|i| {
                let s = if i % 2 == 1 { 1.0 } else { -1.0 };
                let dir = match i % 3 {
                    0 => Direction::new(s, 0.0, 0.0),
                    1 => Direction::new(0.0, s, 0.0),
                    _ => Direction::new(0.0, 0.0, s),
                };
                (Position::new(0.0, 0.0, 0.0), dir)
            })
            .collect()
    }

    #[test]
    fn test_ray_fire_chords_from_origin() {
        let (rt, tree) = tracer_with_mock();
        let cases = [
            ([1.0, 0.0, 0.0], 5.0, SURF_POS_X),
            ([-1.0, 0.0, 0.0], 2.0, SURF_NEG_X),
            ([0.0, 1.0, 0.0], 6.0, SURF_POS_Y),
            ([0.0, -1.0, 0.0], 3.0, SURF_NEG_Y),
            ([0.0, 0.0, 1.0], 7.0, SURF_POS_Z),
            ([0.0, 0.0, -1.0], 4.0, SURF_NEG_Z),
        ];
        for (dir, expected_dist, expected_surf) in cases {
            let (dist, surf) = fire(&rt, tree, [0.0, 0.0, 0.0], dir, HitOrientation::Exiting);
            assert!(
                (dist - expected_dist).abs() < 1e-6,
                "direction {dir:?}: got {dist}"
            );
            assert_eq!(surf, expected_surf, "direction {dir:?}");
        }
    }

    #[test]
    fn test_ray_fire_from_outside_skips_entering_hits() {
        let (rt, tree) = tracer_with_mock();
        // exiting fires pass through the near face and stop at the far one
        let (dist, surf) = fire(
            &rt,
            tree,
            [-10.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            HitOrientation::Exiting,
        );
        assert!((dist - 15.0).abs() < 1e-6);
        assert_eq!(surf, SURF_POS_X);

        let (dist, surf) = fire(
            &rt,
            tree,
            [10.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            HitOrientation::Exiting,
        );
        assert!((dist - 12.0).abs() < 1e-6);
        assert_eq!(surf, SURF_NEG_X);
    }

    #[test]
    fn test_ray_fire_entering_stops_at_near_face() {
        let (rt, tree) = tracer_with_mock();
        let (dist, surf) = fire(
            &rt,
            tree,
            [-10.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            HitOrientation::Entering,
        );
        assert!((dist - 8.0).abs() < 1e-6);
        assert_eq!(surf, SURF_NEG_X);

        let (dist, surf) = fire(
            &rt,
            tree,
            [10.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            HitOrientation::Entering,
        );
        assert!((dist - 5.0).abs() < 1e-6);
        assert_eq!(surf, SURF_POS_X);
    }

    #[test]
    fn test_orientation_duality_orders_distances() {
        let (rt, tree) = tracer_with_mock();
        let (entering, _) = fire(
            &rt,
            tree,
            [-10.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            HitOrientation::Entering,
        );
        let (exiting, _) = fire(
            &rt,
            tree,
            [-10.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            HitOrientation::Exiting,
        );
        assert!(entering < exiting);
    }

    #[test]
    fn test_ray_fire_dist_limit() {
        let (rt, tree) = tracer_with_mock();
        let origin = Position::new(0.0, 0.0, 0.0);
        let dir = Direction::new(1.0, 0.0, 0.0);

        let (dist, surf) = rt
            .ray_fire(tree, origin, dir, 4.5, HitOrientation::Exiting, None)
            .unwrap();
        assert_eq!(surf, ID_NONE);
        assert_eq!(dist, INFTY);

        // just enough distance still hits
        let (dist, surf) = rt
            .ray_fire(tree, origin, dir, 5.1, HitOrientation::Exiting, None)
            .unwrap();
        assert_ne!(surf, ID_NONE);
        assert!((dist - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_ray_fire_negative_dist_limit_rejected() {
        let (rt, tree) = tracer_with_mock();
        let err = rt.ray_fire(
            tree,
            Position::new(0.0, 0.0, 0.0),
            Direction::new(1.0, 0.0, 0.0),
            -1.0,
            HitOrientation::Exiting,
            None,
        );
        assert!(matches!(err, Err(RayTraceError::InvalidArgument(_))));
    }

    #[test]
    fn test_exclude_list_round_trip() {
        let (rt, tree) = tracer_with_mock();
        let origin = Position::new(0.0, 0.0, 0.0);
        let dir = Direction::new(1.0, 0.0, 0.0);

        let mut exclude = Vec::new();
        let (dist, _) = rt
            .ray_fire(
                tree,
                origin,
                dir,
                INFTY,
                HitOrientation::Exiting,
                Some(&mut exclude),
            )
            .unwrap();
        assert!((dist - 5.0).abs() < 1e-6);
        assert_eq!(exclude.len(), 1);

        // the same fire with the hit primitive excluded finds nothing
        let (_, surf) = rt
            .ray_fire(
                tree,
                origin,
                dir,
                INFTY,
                HitOrientation::Exiting,
                Some(&mut exclude),
            )
            .unwrap();
        assert_eq!(surf, ID_NONE);
        assert_eq!(exclude.len(), 1);
    }

    #[test]
    fn test_chord_symmetry_along_generic_direction() {
        let (rt, tree) = tracer_with_mock();
        let dir = [1.0, 2.0, 3.0];
        let neg = [-1.0, -2.0, -3.0];
        let (forward, _) = fire(&rt, tree, [0.0, 0.0, 0.0], dir, HitOrientation::Exiting);
        let (backward, _) = fire(&rt, tree, [0.0, 0.0, 0.0], neg, HitOrientation::Exiting);
        assert!(forward.is_finite() && backward.is_finite());
        // chord of the box along (1,2,3): the z faces bind, (7 + 4) / 3
        assert!((forward + backward - 11.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_avoidance_on_boundary_origin() {
        let (rt, tree) = tracer_with_mock();
        // origin on the +x face, firing outward along its normal
        let (dist, surf) = fire(
            &rt,
            tree,
            [5.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            HitOrientation::Any,
        );
        assert_eq!(surf, ID_NONE);
        assert_eq!(dist, INFTY);
    }

    #[test]
    fn test_point_in_volume_basic() {
        let (rt, tree) = tracer_with_mock();
        assert!(rt
            .point_in_volume(tree, Position::new(0.0, 0.0, 0.0), None, None)
            .unwrap());
        assert!(!rt
            .point_in_volume(tree, Position::new(0.0, 0.0, 1000.0), None, None)
            .unwrap());
        // just inside the +x boundary
        assert!(rt
            .point_in_volume(tree, Position::new(5.0 - 1e-6, 0.0, 0.0), None, None)
            .unwrap());
        // just outside, no direction given
        assert!(!rt
            .point_in_volume(tree, Position::new(5.001, 0.0, 0.0), None, None)
            .unwrap());
    }

    #[test]
    fn test_point_on_boundary_classified_by_direction() {
        let (rt, tree) = tracer_with_mock();
        let dir = Direction::new(1.0, 0.0, 0.0);
        assert!(rt
            .point_in_volume(tree, Position::new(5.0, 0.0, 0.0), Some(dir), None)
            .unwrap());

        assert!(!rt
            .point_in_volume(tree, Position::new(5.1, 0.0, 0.0), Some(dir), None)
            .unwrap());
        assert!(!rt
            .point_in_volume(
                tree,
                Position::new(5.1, 0.0, 0.0),
                Some(Direction::new(-1.0, 0.0, 0.0)),
                None
            )
            .unwrap());
    }

    #[test]
    fn test_point_in_volume_agrees_across_directions() {
        let (rt, tree) = tracer_with_mock();
        let inside = Position::new(1.0, 1.0, 1.0);
        let outside = Position::new(20.0, 0.0, 0.0);
        for dir in [Direction::new(1.0, 0.0, 0.0), Direction::new(0.3, 1.0, 0.2)] {
            assert!(rt.point_in_volume(tree, inside, Some(dir), None).unwrap());
            assert!(!rt.point_in_volume(tree, outside, Some(dir), None).unwrap());
        }
    }

    #[test]
    fn test_containment_glancing_direction_still_resolves() {
        let (rt, tree) = tracer_with_mock();
        // on the +x face firing tangentially along +y: the facet under
        // the point is glancing, classification comes from the far face
        let state = rt
            .point_in_volume_state(
                tree,
                Position::new(5.0, 0.0, 0.0),
                Some(Direction::new(0.0, 1.0, 0.0)),
                None,
            )
            .unwrap();
        assert_ne!(state, PointContainment::OnBoundary);
    }

    #[test]
    fn test_occluded() {
        let (rt, tree) = tracer_with_mock();
        let origin = Position::new(-100.0, 0.0, 0.0);
        assert!(rt
            .occluded(tree, origin, Direction::new(1.0, 0.0, 0.0), INFTY)
            .unwrap());
        assert!(!rt
            .occluded(tree, origin, Direction::new(-1.0, 0.0, 0.0), INFTY)
            .unwrap());
    }

    #[test]
    fn test_closest() {
        let (rt, tree) = tracer_with_mock();
        let (dist, prim) = rt.closest(tree, Position::new(0.0, 0.0, 0.0)).unwrap();
        assert!((dist - 2.0).abs() < 1e-12);
        // nearest facet lies on the -x face
        assert!(prim == 4 || prim == 5);

        let (dist, _) = rt.closest(tree, Position::new(10.0, 0.0, 0.0)).unwrap();
        assert!((dist - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_batched_matches_scalar() {
        let (mut rt, tree) = tracer_with_mock();
        let rays = make_rays(64);

        let scalar: Vec<(f64, MeshId)> = rays
            .iter()
            .map(|(o, d)| {
                rt.ray_fire(tree, *o, *d, INFTY, HitOrientation::Exiting, None)
                    .unwrap()
            })
            .collect();

        let batch = rt
            .ray_fire_batch(tree, &rays, INFTY, HitOrientation::Exiting)
            .unwrap();

        assert_eq!(batch.len(), scalar.len());
        for (i, (b, s)) in batch.iter().zip(&scalar).enumerate() {
            assert_eq!(b.1, s.1, "ray {i}");
            assert_eq!(b.0, s.0, "ray {i}");
        }
    }

    #[test]
    fn test_batched_empty_is_noop() {
        let (mut rt, tree) = tracer_with_mock();
        let hits = rt
            .ray_fire_batch(tree, &[], INFTY, HitOrientation::Exiting)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_register_all_volumes() {
        let mm = MeshMock::new();
        let mut rt = CpuRayTracer::new();
        rt.register_all_volumes(&mm).unwrap();
        assert_eq!(rt.num_surface_trees(), 1);
        assert_eq!(rt.surface_tree_for_volume(0), Some(SurfaceTreeId(0)));
        assert_eq!(rt.element_tree_for_volume(0), None);
    }

    #[test]
    fn test_find_element_and_batch() {
        let mm = TetCubeMock::new();
        let mut rt = CpuRayTracer::new();
        let (_, element_tree) = rt.register_volume(&mm, 0).unwrap();
        let element_tree = element_tree.unwrap();

        let inside = Position::new(0.9, 0.5, 0.1);
        let id = rt.find_element(element_tree, inside).unwrap();
        assert_ne!(id, ID_NONE);
        assert!(point_in_tet_of(&mm, id, &inside));

        let outside = Position::new(1.5, 0.5, 0.5);
        assert_eq!(rt.find_element(element_tree, outside).unwrap(), ID_NONE);

        let points = vec![inside, outside, Position::new(0.1, 0.2, 0.3)];
        let batch = rt.find_element_batch(element_tree, &points).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], id);
        assert_eq!(batch[1], ID_NONE);
        assert_ne!(batch[2], ID_NONE);
    }

    fn point_in_tet_of(mm: &TetCubeMock, element: MeshId, p: &Position) -> bool {
        crate::intersect::point_in_tet(p, &mm.tet_vertices(element))
    }

    #[test]
    fn test_point_in_volume_batch_on_tet_mesh() {
        let mm = TetCubeMock::new();
        let mut rt = CpuRayTracer::new();
        let (tree, _) = rt.register_volume(&mm, 0).unwrap();
        let points = vec![
            Position::new(0.5, 0.5, 0.5),
            Position::new(1.5, 0.5, 0.5),
            Position::new(0.1, 0.9, 0.2),
        ];
        assert_eq!(
            rt.point_in_volume_batch(tree, &points).unwrap(),
            vec![true, false, true]
        );
    }

    #[test]
    fn test_global_surface_tree_queries_any_volume() {
        let mm = MeshMock::new();
        let mut rt = CpuRayTracer::new();
        let global = rt.create_global_surface_tree(&mm).unwrap();
        let (dist, surf) = rt
            .ray_fire(
                global,
                Position::new(0.0, 0.0, 0.0),
                Direction::new(1.0, 0.0, 0.0),
                INFTY,
                HitOrientation::Exiting,
                None,
            )
            .unwrap();
        assert!((dist - 5.0).abs() < 1e-6);
        assert_eq!(surf, SURF_POS_X);

        // registering a volume invalidates the handle
        rt.register_volume(&mm, 0).unwrap();
        let err = rt.ray_fire(
            global,
            Position::new(0.0, 0.0, 0.0),
            Direction::new(1.0, 0.0, 0.0),
            INFTY,
            HitOrientation::Exiting,
            None,
        );
        assert!(matches!(err, Err(RayTraceError::StaleGlobalTree)));
    }

    #[cfg(feature = "gpu")]
    #[test]
    fn test_gpu_operations_unsupported_on_cpu() {
        let (mut rt, tree) = tracer_with_mock();
        let err = rt.ray_fire_prepared(tree, 8, INFTY, HitOrientation::Exiting);
        assert!(matches!(
            err,
            Err(RayTraceError::Unsupported {
                operation: "ray_fire_prepared",
                ..
            })
        ));
        assert!(rt.device_buffers().is_err());
    }
}
