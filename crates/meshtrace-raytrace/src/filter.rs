//! Per-hit filtering: orientation, exclusion, and numerical policy.
//!
//! Traversal hands every candidate intersection to a [`HitFilter`]; the
//! filter decides whether the hit counts. The same filter runs behind
//! every backend, so a candidate found by device-side pruning and a
//! candidate found by host traversal are judged identically.

use meshtrace_math::{Direction, Vec3};
use meshtrace_mesh::MeshId;

/// Which side of a surface a query wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitOrientation {
    /// Accept hits regardless of orientation.
    Any,
    /// Accept hits whose facet normal leaves the target volume along the
    /// ray (the default for tracking a particle to its volume boundary).
    #[default]
    Exiting,
    /// Accept hits entering the target volume.
    Entering,
}

/// Result of a containment query before collapsing to a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointContainment {
    /// The point is inside the volume.
    Inside,
    /// The point is outside the volume.
    Outside,
    /// The point could not be classified after the bounded retries;
    /// reported as outside by convention.
    OnBoundary,
}

/// The flavor of a ray query, which selects the numerical policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayFireKind {
    /// Distance-to-boundary: hits closer than the bump are treated as
    /// the facet the ray originated on and skipped.
    Volume,
    /// Containment parity: zero-distance hits are legitimate (a point
    /// sitting on a face is classified by the fire direction), so only
    /// hits behind the origin are skipped.
    PointContainment,
}

/// Candidate-hit filter for one ray query.
///
/// Holds the query-wide state every candidate is checked against and
/// records whether an ambiguous on-boundary candidate was seen, which
/// containment queries use to trigger a direction retry.
pub struct HitFilter<'a> {
    kind: RayFireKind,
    orientation: HitOrientation,
    exclude: Option<&'a [MeshId]>,
    bump: f64,
    glancing_tolerance: f64,
    direction: Direction,
    inv_dir_norm: f64,
    /// Set when a glancing candidate within the bump of the origin was
    /// rejected; the containment query retries with a nudged direction.
    pub saw_ambiguous: bool,
}

impl<'a> HitFilter<'a> {
    /// Create a filter for one query.
    pub fn new(
        kind: RayFireKind,
        orientation: HitOrientation,
        exclude: Option<&'a [MeshId]>,
        bump: f64,
        glancing_tolerance: f64,
        direction: Direction,
    ) -> Self {
        Self {
            kind,
            orientation,
            exclude,
            bump,
            glancing_tolerance,
            direction,
            inv_dir_norm: 1.0 / direction.norm(),
            saw_ambiguous: false,
        }
    }

    /// The nearest ray parameter this query will accept.
    pub fn lower_bound(&self) -> f64 {
        match self.kind {
            RayFireKind::Volume => self.bump,
            // tolerate roundoff for origins sitting exactly on a facet
            RayFireKind::PointContainment => -1e-6 * self.bump,
        }
    }

    /// Judge one candidate hit.
    ///
    /// `sense_sign` is +1 when the candidate surface faces the target
    /// volume forward, -1 when reverse. Returns `Some(exiting)` when the
    /// hit is accepted, `None` when rejected.
    pub fn check(&mut self, t: f64, primitive_id: MeshId, normal: &Vec3, sense_sign: f64) -> Option<bool> {
        if t < self.lower_bound() {
            return None;
        }

        if let Some(exclude) = self.exclude {
            if exclude.contains(&primitive_id) {
                return None;
            }
        }

        let cos = normal.dot(&self.direction) * self.inv_dir_norm;
        if cos.abs() < self.glancing_tolerance {
            if self.kind == RayFireKind::PointContainment && t.abs() <= self.bump {
                self.saw_ambiguous = true;
            }
            return None;
        }

        let exiting = cos * sense_sign > 0.0;
        match self.orientation {
            HitOrientation::Any => Some(exiting),
            HitOrientation::Exiting if exiting => Some(true),
            HitOrientation::Entering if !exiting => Some(false),
            _ => None,
        }
    }
}
