//! Backend-independent query execution over registry trees.
//!
//! Both backends resolve scalar queries here; the GPU backend also runs
//! its device-pruned candidates through the same accept path, which is
//! what keeps batched and scalar answers elementwise identical.

use meshtrace_math::{Direction, Position, Vec3};
use meshtrace_mesh::{MeshId, ID_NONE};

use crate::config::RayTracerConfig;
use crate::error::{RayTraceError, Result};
use crate::filter::{HitOrientation, PointContainment, RayFireKind};
use crate::ray::Ray;
use crate::tree::{ElementTreeId, SurfaceTreeId, TreeRegistry};
use crate::INFTY;

/// Stable fallback direction for containment queries.
const DEFAULT_CONTAINMENT_DIRECTION: Vec3 = Vec3::new(1.0, 0.0, 0.0);

pub(crate) fn check_dist_limit(dist_limit: f64) -> Result<()> {
    if dist_limit >= 0.0 {
        Ok(())
    } else {
        Err(RayTraceError::InvalidArgument(format!(
            "dist_limit must be non-negative, got {dist_limit}"
        )))
    }
}

/// Nearest filter-accepting surface hit; `(INFTY, ID_NONE)` on a miss.
/// Appends the winning primitive to `exclude` when provided.
pub(crate) fn ray_fire(
    registry: &TreeRegistry,
    config: &RayTracerConfig,
    tree: SurfaceTreeId,
    origin: Position,
    direction: Direction,
    dist_limit: f64,
    orientation: HitOrientation,
    mut exclude: Option<&mut Vec<MeshId>>,
) -> Result<(f64, MeshId)> {
    check_dist_limit(dist_limit)?;
    let tree = registry.surface_tree(tree)?;

    let ray = Ray::new(origin, direction);
    let (hit, _) = tree.nearest_hit(
        &ray,
        dist_limit,
        orientation,
        RayFireKind::Volume,
        exclude.as_deref().map(Vec::as_slice),
        config,
    );

    match hit {
        Some(hit) => {
            if let Some(list) = exclude.as_mut() {
                list.push(tree.primitive_refs()[hit.ordinal as usize].primitive_id);
            }
            Ok((hit.t, tree.surface_of(hit.ordinal).surface_id))
        }
        None => Ok((INFTY, ID_NONE)),
    }
}

/// Containment with the full tri-state answer.
///
/// When the only candidates near the origin are glancing (direction in
/// the facet plane), the answer is ambiguous; retry along a direction
/// rotated by a small deterministic angle before giving up and calling
/// the point on-boundary.
pub(crate) fn point_in_volume_state(
    registry: &TreeRegistry,
    config: &RayTracerConfig,
    tree: SurfaceTreeId,
    point: Position,
    direction: Option<Direction>,
    mut exclude: Option<&mut Vec<MeshId>>,
) -> Result<PointContainment> {
    let tree = registry.surface_tree(tree)?;
    let mut dir = direction.unwrap_or(DEFAULT_CONTAINMENT_DIRECTION);

    for attempt in 0..=config.containment_retries {
        let ray = Ray::new(point, dir);
        let (hit, ambiguous) = tree.nearest_hit(
            &ray,
            INFTY,
            HitOrientation::Any,
            RayFireKind::PointContainment,
            exclude.as_deref().map(Vec::as_slice),
            config,
        );

        if let Some(hit) = hit {
            if let Some(list) = exclude.as_mut() {
                list.push(tree.primitive_refs()[hit.ordinal as usize].primitive_id);
            }
            return Ok(if hit.exiting {
                PointContainment::Inside
            } else {
                PointContainment::Outside
            });
        }

        if !ambiguous {
            return Ok(PointContainment::Outside);
        }

        dir = nudge_direction(&dir, attempt);
    }

    Ok(PointContainment::OnBoundary)
}

/// Boolean containment: on-boundary collapses to outside.
pub(crate) fn point_in_volume(
    registry: &TreeRegistry,
    config: &RayTracerConfig,
    tree: SurfaceTreeId,
    point: Position,
    direction: Option<Direction>,
    exclude: Option<&mut Vec<MeshId>>,
) -> Result<bool> {
    let state = point_in_volume_state(registry, config, tree, point, direction, exclude)?;
    Ok(state == PointContainment::Inside)
}

/// Distance to the nearest surface point and the nearest triangle id.
pub(crate) fn closest(
    registry: &TreeRegistry,
    tree: SurfaceTreeId,
    origin: Position,
) -> Result<(f64, MeshId)> {
    let tree = registry.surface_tree(tree)?;
    Ok(tree.closest_point(&origin))
}

/// Early-exit visibility test.
pub(crate) fn occluded(
    registry: &TreeRegistry,
    config: &RayTracerConfig,
    tree: SurfaceTreeId,
    origin: Position,
    direction: Direction,
    dist_limit: f64,
) -> Result<bool> {
    check_dist_limit(dist_limit)?;
    let tree = registry.surface_tree(tree)?;
    let ray = Ray::new(origin, direction);
    Ok(tree.any_hit(&ray, dist_limit, HitOrientation::Any, None, config))
}

/// Point location in an element tree.
pub(crate) fn find_element(
    registry: &TreeRegistry,
    tree: ElementTreeId,
    point: Position,
) -> Result<MeshId> {
    let tree = registry.element_tree(tree)?;
    Ok(tree.find_element(&point))
}

/// Rotate `dir` by a small angle about the coordinate axis it is least
/// aligned with (Rodrigues), growing the angle with each attempt.
pub(crate) fn nudge_direction(dir: &Vec3, attempt: u32) -> Vec3 {
    let angle = 1e-3 * (attempt + 1) as f64;

    let abs = Vec3::new(dir.x.abs(), dir.y.abs(), dir.z.abs());
    let axis = if abs.x <= abs.y && abs.x <= abs.z {
        Vec3::x()
    } else if abs.y <= abs.z {
        Vec3::y()
    } else {
        Vec3::z()
    };

    let (sin, cos) = angle.sin_cos();
    dir * cos + axis.cross(dir) * sin + axis * (axis.dot(dir)) * (1.0 - cos)
}
