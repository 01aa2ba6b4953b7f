//! Tree registry: builds and owns the per-volume and global
//! acceleration structures.
//!
//! A surface tree accelerates ray queries against the triangles
//! bounding one volume; an element tree accelerates point location in a
//! volume's tetrahedra. Handles are dense and monotonically assigned,
//! and are never reused, so a stale handle can be recognized for the
//! lifetime of the registry.

use std::collections::HashMap;
use std::fmt;

use meshtrace_math::{Aabb3, Point3, Vec3};
use meshtrace_mesh::{MeshId, MeshManager, Sense, ID_NONE};

use crate::bvh::Bvh;
use crate::config::RayTracerConfig;
use crate::error::{RayTraceError, Result};
use crate::filter::{HitFilter, HitOrientation, RayFireKind};
use crate::geometry_data::GeometryUserData;
use crate::intersect::{
    closest_point_triangle, facet_normal, intersect_triangle, point_in_tet, tet_aabb,
    triangle_aabb,
};
use crate::primitive_ref::PrimitiveRef;
use crate::ray::Ray;
use crate::INFTY;

/// Handle to a surface tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceTreeId(pub(crate) u32);

/// Handle to an element tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementTreeId(pub(crate) u32);

impl fmt::Display for SurfaceTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ElementTreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One triangle of a surface tree, in build order.
#[derive(Debug, Clone)]
pub(crate) struct TriangleRecord {
    pub verts: [Point3; 3],
    /// Unit facet normal from the winding order; points from the
    /// surface's forward volume into its reverse volume.
    pub normal: Vec3,
    /// Index into the tree's surface records.
    pub surface: u32,
}

/// An accepted hit, still in tree-internal terms.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HitRecord {
    pub t: f64,
    pub ordinal: u32,
    pub exiting: bool,
}

/// BVH over the triangles bounding one volume (or, for the global tree,
/// every registered surface).
pub struct SurfaceTree {
    volume: MeshId,
    bvh: Bvh,
    primitive_refs: Vec<PrimitiveRef>,
    triangles: Vec<TriangleRecord>,
    surfaces: Vec<GeometryUserData>,
    bump: f64,
    stale: bool,
}

impl SurfaceTree {
    fn build(
        mesh: &dyn MeshManager,
        volume: MeshId,
        surface_ids: &[MeshId],
        bump: f64,
    ) -> Result<Self> {
        let mut triangles = Vec::new();
        let mut primitive_refs = Vec::new();
        let mut surfaces = Vec::new();

        for &surface in surface_ids {
            let (forward, reverse) = mesh.surface_senses(surface);
            let sense = if volume == ID_NONE || forward == volume {
                Sense::Forward
            } else {
                Sense::Reverse
            };

            let surface_index = surfaces.len() as u32;
            let mut bounds = Aabb3::empty();
            for face in mesh.get_surface_faces(surface) {
                let verts = mesh.triangle_vertices(face);
                let cross = (verts[1] - verts[0]).cross(&(verts[2] - verts[0]));
                if cross.norm() < 1e-300 {
                    return Err(RayTraceError::Build(format!(
                        "degenerate triangle {face} on surface {surface}"
                    )));
                }
                bounds.include(&triangle_aabb(&verts));
                primitive_refs.push(PrimitiveRef {
                    primitive_id: face,
                    sense,
                });
                triangles.push(TriangleRecord {
                    verts,
                    normal: facet_normal(&verts),
                    surface: surface_index,
                });
            }

            surfaces.push(GeometryUserData {
                surface_id: surface,
                forward_volume: forward,
                reverse_volume: reverse,
                bounds,
                bump,
            });
        }

        let items: Vec<(u32, Aabb3)> = triangles
            .iter()
            .enumerate()
            .map(|(ord, tri)| (ord as u32, triangle_aabb(&tri.verts)))
            .collect();

        Ok(Self {
            volume,
            bvh: Bvh::build(&items),
            primitive_refs,
            triangles,
            surfaces,
            bump,
            stale: false,
        })
    }

    /// The volume this tree bounds ([`ID_NONE`] for the global tree).
    pub fn volume(&self) -> MeshId {
        self.volume
    }

    /// Numerical tolerance of the owning volume.
    pub fn bump(&self) -> f64 {
        self.bump
    }

    /// Number of triangles in the tree.
    pub fn num_primitives(&self) -> usize {
        self.triangles.len()
    }

    /// Primitive references in BVH ordinal order.
    pub fn primitive_refs(&self) -> &[PrimitiveRef] {
        &self.primitive_refs
    }

    /// Per-surface user data of this tree.
    pub fn user_data(&self) -> &[GeometryUserData] {
        &self.surfaces
    }

    /// User data of the surface owning a primitive ordinal.
    pub(crate) fn surface_of(&self, ordinal: u32) -> &GeometryUserData {
        &self.surfaces[self.triangles[ordinal as usize].surface as usize]
    }

    pub(crate) fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub(crate) fn triangles(&self) -> &[TriangleRecord] {
        &self.triangles
    }

    /// Nearest filter-accepting hit along `ray` within
    /// `[lower_bound, dist_limit]`, plus whether an ambiguous boundary
    /// candidate was rejected on the way.
    pub(crate) fn nearest_hit(
        &self,
        ray: &Ray,
        dist_limit: f64,
        orientation: HitOrientation,
        kind: RayFireKind,
        exclude: Option<&[MeshId]>,
        config: &RayTracerConfig,
    ) -> (Option<HitRecord>, bool) {
        let mut filter = HitFilter::new(
            kind,
            orientation,
            exclude,
            self.bump,
            config.glancing_tolerance,
            ray.direction,
        );

        let mut best = None;
        let mut window = dist_limit;
        self.bvh.traverse_nearest(ray, &mut window, &mut |ordinal, window| {
            if let Some(hit) = self.test_candidate(ray, ordinal, *window, &mut filter) {
                best = Some(hit);
                *window = hit.t;
            }
        });

        (best, filter.saw_ambiguous)
    }

    /// Nearest filter-accepting hit among an explicit candidate set.
    ///
    /// Used to resolve device-side pruning results through the exact
    /// same accept path as host traversal.
    pub(crate) fn nearest_hit_among(
        &self,
        ray: &Ray,
        ordinals: &[u32],
        dist_limit: f64,
        orientation: HitOrientation,
        kind: RayFireKind,
        exclude: Option<&[MeshId]>,
        config: &RayTracerConfig,
    ) -> (Option<HitRecord>, bool) {
        let mut filter = HitFilter::new(
            kind,
            orientation,
            exclude,
            self.bump,
            config.glancing_tolerance,
            ray.direction,
        );

        let mut best: Option<HitRecord> = None;
        let mut window = dist_limit;
        for &ordinal in ordinals {
            if let Some(hit) = self.test_candidate(ray, ordinal, window, &mut filter) {
                best = Some(hit);
                window = hit.t;
            }
        }

        (best, filter.saw_ambiguous)
    }

    fn test_candidate(
        &self,
        ray: &Ray,
        ordinal: u32,
        window: f64,
        filter: &mut HitFilter,
    ) -> Option<HitRecord> {
        let tri = &self.triangles[ordinal as usize];
        let t = intersect_triangle(ray, &tri.verts)?;
        if t > window {
            return None;
        }
        let pref = &self.primitive_refs[ordinal as usize];
        let exiting = filter.check(t, pref.primitive_id, &tri.normal, pref.sense.sign())?;
        Some(HitRecord {
            t,
            ordinal,
            exiting,
        })
    }

    /// Whether any filter-accepting hit exists within `dist_limit`.
    pub(crate) fn any_hit(
        &self,
        ray: &Ray,
        dist_limit: f64,
        orientation: HitOrientation,
        exclude: Option<&[MeshId]>,
        config: &RayTracerConfig,
    ) -> bool {
        let mut filter = HitFilter::new(
            RayFireKind::Volume,
            orientation,
            exclude,
            self.bump,
            config.glancing_tolerance,
            ray.direction,
        );

        self.bvh.traverse_any(ray, dist_limit, &mut |ordinal| {
            self.test_candidate(ray, ordinal, dist_limit, &mut filter)
                .is_some()
        })
    }

    /// Distance from `origin` to the nearest point on any triangle, and
    /// the triangle's mesh id. `(INFTY, ID_NONE)` for an empty tree.
    pub(crate) fn closest_point(&self, origin: &Point3) -> (f64, MeshId) {
        let mut best_d2 = INFTY;
        let mut best_prim = ID_NONE;
        self.bvh.traverse_closest(origin, &mut best_d2, &mut |ordinal, best_d2| {
            let tri = &self.triangles[ordinal as usize];
            let q = closest_point_triangle(origin, &tri.verts);
            let d2 = (q - *origin).norm_squared();
            if d2 < *best_d2 {
                *best_d2 = d2;
                best_prim = self.primitive_refs[ordinal as usize].primitive_id;
            }
        });
        (best_d2.sqrt(), best_prim)
    }
}

/// BVH over the tetrahedra of one volume (or all volumes, for the
/// global tree).
pub struct ElementTree {
    volume: MeshId,
    bvh: Bvh,
    primitive_refs: Vec<PrimitiveRef>,
    tets: Vec<[Point3; 4]>,
    stale: bool,
}

impl ElementTree {
    fn build(mesh: &dyn MeshManager, volume: MeshId, elements: &[MeshId]) -> Result<Self> {
        let mut tets = Vec::with_capacity(elements.len());
        let mut primitive_refs = Vec::with_capacity(elements.len());
        for &element in elements {
            tets.push(mesh.tet_vertices(element));
            primitive_refs.push(PrimitiveRef {
                primitive_id: element,
                sense: Sense::Forward,
            });
        }

        let items: Vec<(u32, Aabb3)> = tets
            .iter()
            .enumerate()
            .map(|(ord, verts)| (ord as u32, tet_aabb(verts)))
            .collect();

        Ok(Self {
            volume,
            bvh: Bvh::build(&items),
            primitive_refs,
            tets,
            stale: false,
        })
    }

    /// The volume this tree indexes ([`ID_NONE`] for the global tree).
    pub fn volume(&self) -> MeshId {
        self.volume
    }

    /// Number of tetrahedra in the tree.
    pub fn num_primitives(&self) -> usize {
        self.tets.len()
    }

    /// The first tetrahedron containing `point`, or [`ID_NONE`].
    pub(crate) fn find_element(&self, point: &Point3) -> MeshId {
        let mut found = ID_NONE;
        self.bvh.traverse_point(point, &mut |ordinal| {
            if point_in_tet(point, &self.tets[ordinal as usize]) {
                found = self.primitive_refs[ordinal as usize].primitive_id;
                true
            } else {
                false
            }
        });
        found
    }
}

/// Owner of every tree built by one ray tracer.
#[derive(Default)]
pub struct TreeRegistry {
    surface_trees: Vec<SurfaceTree>,
    element_trees: Vec<ElementTree>,
    volume_to_surface: HashMap<MeshId, SurfaceTreeId>,
    volume_to_element: HashMap<MeshId, ElementTreeId>,
    global_surface: Option<SurfaceTreeId>,
    global_element: Option<ElementTreeId>,
}

impl TreeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle the next surface-tree build will be issued.
    ///
    /// Handles are dense and monotonically assigned, never reused.
    pub fn next_surface_tree_id(&self) -> SurfaceTreeId {
        SurfaceTreeId(self.surface_trees.len() as u32)
    }

    /// The handle the next element-tree build will be issued.
    pub fn next_element_tree_id(&self) -> ElementTreeId {
        ElementTreeId(self.element_trees.len() as u32)
    }

    /// Number of surface trees issued so far (global included).
    pub fn num_surface_trees(&self) -> usize {
        self.surface_trees.len()
    }

    /// Number of element trees issued so far (global included).
    pub fn num_element_trees(&self) -> usize {
        self.element_trees.len()
    }

    /// The surface tree registered for `volume`, if any.
    pub fn surface_tree_for_volume(&self, volume: MeshId) -> Option<SurfaceTreeId> {
        self.volume_to_surface.get(&volume).copied()
    }

    /// The element tree registered for `volume`, if any.
    pub fn element_tree_for_volume(&self, volume: MeshId) -> Option<ElementTreeId> {
        self.volume_to_element.get(&volume).copied()
    }

    /// The current global surface tree, if built.
    pub fn global_surface_tree(&self) -> Option<SurfaceTreeId> {
        self.global_surface
    }

    /// The current global element tree, if built.
    pub fn global_element_tree(&self) -> Option<ElementTreeId> {
        self.global_element
    }

    /// Look up a surface tree, refusing stale global handles.
    pub fn surface_tree(&self, id: SurfaceTreeId) -> Result<&SurfaceTree> {
        let tree = self
            .surface_trees
            .get(id.0 as usize)
            .ok_or(RayTraceError::UnknownSurfaceTree(id.0))?;
        if tree.stale {
            return Err(RayTraceError::StaleGlobalTree);
        }
        Ok(tree)
    }

    /// Look up an element tree, refusing stale global handles.
    pub fn element_tree(&self, id: ElementTreeId) -> Result<&ElementTree> {
        let tree = self
            .element_trees
            .get(id.0 as usize)
            .ok_or(RayTraceError::UnknownElementTree(id.0))?;
        if tree.stale {
            return Err(RayTraceError::StaleGlobalTree);
        }
        Ok(tree)
    }

    /// Build the surface tree of `volume`. Registering a volume twice
    /// returns the previously issued handle.
    pub fn create_surface_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
        config: &RayTracerConfig,
    ) -> Result<SurfaceTreeId> {
        if let Some(id) = self.volume_to_surface.get(&volume) {
            log::debug!("volume {volume} already registered; returning surface tree {id}");
            return Ok(*id);
        }
        if !mesh.volumes().contains(&volume) {
            return Err(RayTraceError::UnknownVolume(volume));
        }

        let bump = config.bump(mesh.bounding_box(volume).max_extent());
        let surfaces = mesh.get_volume_surfaces(volume);
        let tree = SurfaceTree::build(mesh, volume, &surfaces, bump)?;
        log::debug!(
            "built surface tree for volume {volume}: {} triangles over {} surfaces",
            tree.num_primitives(),
            surfaces.len()
        );

        let id = SurfaceTreeId(self.surface_trees.len() as u32);
        self.surface_trees.push(tree);
        self.volume_to_surface.insert(volume, id);
        self.invalidate_globals();
        Ok(id)
    }

    /// Build the element tree of `volume`, or `None` when the volume
    /// carries no tetrahedra. Registering a volume twice returns the
    /// previously issued handle.
    pub fn create_element_tree(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
        _config: &RayTracerConfig,
    ) -> Result<Option<ElementTreeId>> {
        if let Some(id) = self.volume_to_element.get(&volume) {
            return Ok(Some(*id));
        }
        if !mesh.volumes().contains(&volume) {
            return Err(RayTraceError::UnknownVolume(volume));
        }

        let elements = mesh.get_volume_elements(volume);
        if elements.is_empty() {
            return Ok(None);
        }

        let tree = ElementTree::build(mesh, volume, &elements)?;
        log::debug!(
            "built element tree for volume {volume}: {} tetrahedra",
            tree.num_primitives()
        );

        let id = ElementTreeId(self.element_trees.len() as u32);
        self.element_trees.push(tree);
        self.volume_to_element.insert(volume, id);
        self.invalidate_globals();
        Ok(Some(id))
    }

    /// Build both trees of `volume`.
    pub fn register_volume(
        &mut self,
        mesh: &dyn MeshManager,
        volume: MeshId,
        config: &RayTracerConfig,
    ) -> Result<(SurfaceTreeId, Option<ElementTreeId>)> {
        let surface_tree = self.create_surface_tree(mesh, volume, config)?;
        let element_tree = self.create_element_tree(mesh, volume, config)?;
        Ok((surface_tree, element_tree))
    }

    /// Build one tree over the union of all surfaces in the mesh.
    ///
    /// Any later per-volume registration marks the handle stale; queries
    /// against a stale handle are refused until the tree is rebuilt.
    pub fn create_global_surface_tree(
        &mut self,
        mesh: &dyn MeshManager,
        config: &RayTracerConfig,
    ) -> Result<SurfaceTreeId> {
        let mut bounds = Aabb3::empty();
        for volume in mesh.volumes() {
            bounds.include(&mesh.bounding_box(volume));
        }
        let bump = config.bump(if bounds.is_empty() {
            0.0
        } else {
            bounds.max_extent()
        });

        let surfaces = mesh.surfaces();
        let tree = SurfaceTree::build(mesh, ID_NONE, &surfaces, bump)?;

        if let Some(old) = self.global_surface {
            self.surface_trees[old.0 as usize].stale = true;
        }
        let id = SurfaceTreeId(self.surface_trees.len() as u32);
        self.surface_trees.push(tree);
        self.global_surface = Some(id);
        Ok(id)
    }

    /// Build one tree over the tetrahedra of every volume in the mesh.
    pub fn create_global_element_tree(
        &mut self,
        mesh: &dyn MeshManager,
        _config: &RayTracerConfig,
    ) -> Result<Option<ElementTreeId>> {
        let mut elements = Vec::new();
        for volume in mesh.volumes() {
            elements.extend(mesh.get_volume_elements(volume));
        }
        if elements.is_empty() {
            return Ok(None);
        }

        let tree = ElementTree::build(mesh, ID_NONE, &elements)?;

        if let Some(old) = self.global_element {
            self.element_trees[old.0 as usize].stale = true;
        }
        let id = ElementTreeId(self.element_trees.len() as u32);
        self.element_trees.push(tree);
        self.global_element = Some(id);
        Ok(Some(id))
    }

    /// A per-volume registration outdates any built global tree.
    fn invalidate_globals(&mut self) {
        if let Some(id) = self.global_surface.take() {
            self.surface_trees[id.0 as usize].stale = true;
        }
        if let Some(id) = self.global_element.take() {
            self.element_trees[id.0 as usize].stale = true;
        }
    }
}
