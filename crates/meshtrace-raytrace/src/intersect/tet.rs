//! Point-in-tetrahedron testing.

use meshtrace_math::{Aabb3, Point3};

fn orient(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a))
}

/// Whether `p` lies inside the tetrahedron (boundary inclusive).
///
/// Barycentric sign test: the point is inside when replacing each vertex
/// with `p` in turn preserves the sign of the tet's signed volume.
/// Vertex ordering may be either handed; degenerate (flat) tets contain
/// nothing.
pub fn point_in_tet(p: &Point3, verts: &[Point3; 4]) -> bool {
    let (a, b, c, d) = (&verts[0], &verts[1], &verts[2], &verts[3]);
    let vol = orient(a, b, c, d);
    if vol == 0.0 {
        return false;
    }

    // boundary points produce a zero sub-volume; keep them
    let tol = -1e-12 * vol.abs();
    let sign = vol.signum();
    sign * orient(p, b, c, d) >= tol
        && sign * orient(a, p, c, d) >= tol
        && sign * orient(a, b, p, d) >= tol
        && sign * orient(a, b, c, p) >= tol
}

/// Bounding box of a tetrahedron.
pub fn tet_aabb(verts: &[Point3; 4]) -> Aabb3 {
    let mut aabb = Aabb3::empty();
    for v in verts {
        aabb.include_point(v);
    }
    aabb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn test_interior_point() {
        assert!(point_in_tet(&Point3::new(0.1, 0.1, 0.1), &unit_tet()));
    }

    #[test]
    fn test_exterior_point() {
        assert!(!point_in_tet(&Point3::new(0.5, 0.5, 0.5), &unit_tet()));
        assert!(!point_in_tet(&Point3::new(-0.1, 0.1, 0.1), &unit_tet()));
    }

    #[test]
    fn test_boundary_points_included() {
        // vertex, edge midpoint, face interior
        assert!(point_in_tet(&Point3::new(0.0, 0.0, 0.0), &unit_tet()));
        assert!(point_in_tet(&Point3::new(0.5, 0.0, 0.0), &unit_tet()));
        assert!(point_in_tet(&Point3::new(0.25, 0.25, 0.0), &unit_tet()));
    }

    #[test]
    fn test_reversed_vertex_order() {
        let mut verts = unit_tet();
        verts.swap(0, 1);
        assert!(point_in_tet(&Point3::new(0.1, 0.1, 0.1), &verts));
        assert!(!point_in_tet(&Point3::new(0.5, 0.5, 0.5), &verts));
    }

    #[test]
    fn test_degenerate_tet_contains_nothing() {
        let flat = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert!(!point_in_tet(&Point3::new(0.5, 0.5, 0.0), &flat));
    }
}
