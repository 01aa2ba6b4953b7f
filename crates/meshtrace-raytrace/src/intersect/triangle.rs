//! Ray-triangle intersection and point-triangle proximity.

use meshtrace_math::{Aabb3, Point3, Vec3};

use crate::Ray;

/// Intersect a ray with a triangle (Möller–Trumbore, no culling).
///
/// Returns the ray parameter of the intersection point, which may be
/// negative for hits behind the origin; callers window the result.
/// Returns `None` when the ray is parallel to the triangle plane or
/// misses the triangle.
pub fn intersect_triangle(ray: &Ray, verts: &[Point3; 3]) -> Option<f64> {
    let edge1 = verts[1] - verts[0];
    let edge2 = verts[2] - verts[0];

    let pvec = ray.direction.cross(&edge2);
    let det = edge1.dot(&pvec);

    // Parallel within floating-point resolution; the glancing-hit rule
    // in the filter covers the near-parallel band above this.
    if det.abs() < 1e-300 {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray.origin - verts[0];
    let u = tvec.dot(&pvec) * inv_det;
    if !(-1e-12..=1.0 + 1e-12).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(&edge1);
    let v = ray.direction.dot(&qvec) * inv_det;
    if v < -1e-12 || u + v > 1.0 + 1e-12 {
        return None;
    }

    Some(edge2.dot(&qvec) * inv_det)
}

/// Unit facet normal of a triangle, from its winding order.
pub fn facet_normal(verts: &[Point3; 3]) -> Vec3 {
    (verts[1] - verts[0])
        .cross(&(verts[2] - verts[0]))
        .normalize()
}

/// Bounding box of a triangle.
pub fn triangle_aabb(verts: &[Point3; 3]) -> Aabb3 {
    let mut aabb = Aabb3::empty();
    for v in verts {
        aabb.include_point(v);
    }
    aabb
}

/// Closest point on a triangle to `p`.
///
/// Region classification over the triangle's Voronoi diagram; handles
/// vertex, edge, and interior cases.
pub fn closest_point_triangle(p: &Point3, verts: &[Point3; 3]) -> Point3 {
    let (a, b, c) = (verts[0], verts[1], verts[2]);
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + v * ab;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + w * ac;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + w * (c - b);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> [Point3; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ]
    }

    #[test]
    fn test_hit_interior() {
        let ray = Ray::new(Point3::new(0.5, 0.5, 3.0), Vec3::new(0.0, 0.0, -1.0));
        let t = intersect_triangle(&ray, &tri()).unwrap();
        assert!((t - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_hit_behind_origin_has_negative_t() {
        let ray = Ray::new(Point3::new(0.5, 0.5, -3.0), Vec3::new(0.0, 0.0, -1.0));
        let t = intersect_triangle(&ray, &tri()).unwrap();
        assert!((t + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_miss_outside_edges() {
        let ray = Ray::new(Point3::new(1.5, 1.5, 3.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(intersect_triangle(&ray, &tri()).is_none());
    }

    #[test]
    fn test_parallel_ray() {
        let ray = Ray::new(Point3::new(0.5, 0.5, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(intersect_triangle(&ray, &tri()).is_none());
    }

    #[test]
    fn test_facet_normal_from_winding() {
        let n = facet_normal(&tri());
        assert!((n - Vec3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_closest_point_regions() {
        let t = tri();
        // interior projects straight down
        let q = closest_point_triangle(&Point3::new(0.5, 0.5, 2.0), &t);
        assert!((q - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
        // vertex region
        let q = closest_point_triangle(&Point3::new(-1.0, -1.0, 0.0), &t);
        assert!((q - t[0]).norm() < 1e-12);
        // edge region of ab
        let q = closest_point_triangle(&Point3::new(1.0, -1.0, 0.0), &t);
        assert!((q - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        // edge region of the hypotenuse
        let q = closest_point_triangle(&Point3::new(2.0, 2.0, 0.0), &t);
        assert!((q - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }
}
