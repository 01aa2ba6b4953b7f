//! In-crate mock meshes for kernel testing.
//!
//! [`MeshMock`] is a single watertight box volume bounded by six
//! two-triangle surfaces; [`TetCubeMock`] adds a tetrahedralized unit
//! cube for element-location queries. Both hand out coordinates in the
//! same way a real mesh-database adapter would.

use meshtrace_math::{Aabb3, Point3};

use crate::{MeshId, MeshManager, ID_NONE};

/// One box volume, min (−2,−3,−4), max (5,6,7), bounded by six surfaces
/// of two triangles each.
///
/// Surface `s` owns faces `2s` and `2s + 1`; every surface faces the
/// volume forward (normals point outward), so surface senses are
/// `(0, ID_NONE)`.
pub struct MeshMock {
    bounds: Aabb3,
    vertices: Vec<Point3>,
    connectivity: Vec<[usize; 3]>,
}

impl MeshMock {
    /// Triangle connectivity of the box, grouped in surface pairs:
    /// upper z, lower z, lower x, upper x, lower y, upper y.
    const CONNECTIVITY: [[usize; 3]; 12] = [
        [0, 1, 3],
        [3, 1, 2],
        [4, 7, 5],
        [7, 6, 5],
        [6, 3, 2],
        [7, 3, 6],
        [0, 4, 1],
        [5, 1, 4],
        [0, 3, 4],
        [7, 4, 3],
        [1, 6, 2],
        [6, 1, 5],
    ];

    /// Build the mock box.
    pub fn new() -> Self {
        let bounds = Aabb3::new(Point3::new(-2.0, -3.0, -4.0), Point3::new(5.0, 6.0, 7.0));
        let (lo, hi) = (bounds.min, bounds.max);
        let vertices = vec![
            // vertices in the upper z plane
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
            Point3::new(lo.x, lo.y, hi.z),
            // vertices in the lower z plane
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, lo.z),
        ];
        Self {
            bounds,
            vertices,
            connectivity: Self::CONNECTIVITY.to_vec(),
        }
    }
}

impl Default for MeshMock {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshManager for MeshMock {
    fn volumes(&self) -> Vec<MeshId> {
        vec![0]
    }

    fn surfaces(&self) -> Vec<MeshId> {
        (0..6).collect()
    }

    fn get_volume_surfaces(&self, _volume: MeshId) -> Vec<MeshId> {
        (0..6).collect()
    }

    fn surface_senses(&self, _surface: MeshId) -> (MeshId, MeshId) {
        (0, ID_NONE)
    }

    fn get_surface_faces(&self, surface: MeshId) -> Vec<MeshId> {
        let start = surface * 2;
        vec![start, start + 1]
    }

    fn get_surface_vertices(&self, surface: MeshId) -> Vec<Point3> {
        let mut indices = Vec::new();
        for face in self.get_surface_faces(surface) {
            for &v in &self.connectivity[face as usize] {
                if !indices.contains(&v) {
                    indices.push(v);
                }
            }
        }
        indices.into_iter().map(|v| self.vertices[v]).collect()
    }

    fn get_surface_connectivity(&self, surface: MeshId) -> Vec<usize> {
        let mut indices = Vec::new();
        let mut flat = Vec::new();
        for face in self.get_surface_faces(surface) {
            for &v in &self.connectivity[face as usize] {
                let local = match indices.iter().position(|&i| i == v) {
                    Some(local) => local,
                    None => {
                        indices.push(v);
                        indices.len() - 1
                    }
                };
                flat.push(local);
            }
        }
        flat
    }

    fn triangle_vertices(&self, face: MeshId) -> [Point3; 3] {
        let conn = &self.connectivity[face as usize];
        [
            self.vertices[conn[0]],
            self.vertices[conn[1]],
            self.vertices[conn[2]],
        ]
    }

    fn tet_vertices(&self, element: MeshId) -> [Point3; 4] {
        panic!("MeshMock has no volume elements (requested {element})");
    }

    fn bounding_box(&self, _volume: MeshId) -> Aabb3 {
        self.bounds
    }
}

/// A unit cube `[0,1]^3` split into six tetrahedra around the main
/// diagonal, bounded by a single twelve-triangle surface.
pub struct TetCubeMock {
    vertices: Vec<Point3>,
    faces: Vec<[usize; 3]>,
    tets: Vec<[usize; 4]>,
}

impl TetCubeMock {
    /// Build the tetrahedralized cube.
    pub fn new() -> Self {
        // corner b has coordinates (b & 1, b >> 1 & 1, b >> 2 & 1)
        let vertices = (0..8)
            .map(|b| {
                Point3::new(
                    (b & 1) as f64,
                    ((b >> 1) & 1) as f64,
                    ((b >> 2) & 1) as f64,
                )
            })
            .collect();
        // boundary triangles wound so facet normals point outward
        let faces = vec![
            [0, 2, 3],
            [0, 3, 1],
            [4, 5, 7],
            [4, 7, 6],
            [0, 4, 6],
            [0, 6, 2],
            [1, 3, 7],
            [1, 7, 5],
            [0, 1, 5],
            [0, 5, 4],
            [2, 6, 7],
            [2, 7, 3],
        ];
        // six tets sharing the main diagonal 0-7
        let tets = vec![
            [0, 1, 3, 7],
            [0, 1, 5, 7],
            [0, 2, 3, 7],
            [0, 2, 6, 7],
            [0, 4, 5, 7],
            [0, 4, 6, 7],
        ];
        Self {
            vertices,
            faces,
            tets,
        }
    }
}

impl Default for TetCubeMock {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshManager for TetCubeMock {
    fn volumes(&self) -> Vec<MeshId> {
        vec![0]
    }

    fn surfaces(&self) -> Vec<MeshId> {
        vec![0]
    }

    fn get_volume_surfaces(&self, _volume: MeshId) -> Vec<MeshId> {
        vec![0]
    }

    fn surface_senses(&self, _surface: MeshId) -> (MeshId, MeshId) {
        (0, ID_NONE)
    }

    fn get_surface_faces(&self, _surface: MeshId) -> Vec<MeshId> {
        (0..self.faces.len() as MeshId).collect()
    }

    fn get_surface_vertices(&self, _surface: MeshId) -> Vec<Point3> {
        self.vertices.clone()
    }

    fn get_surface_connectivity(&self, _surface: MeshId) -> Vec<usize> {
        self.faces.iter().flatten().copied().collect()
    }

    fn triangle_vertices(&self, face: MeshId) -> [Point3; 3] {
        let conn = &self.faces[face as usize];
        [
            self.vertices[conn[0]],
            self.vertices[conn[1]],
            self.vertices[conn[2]],
        ]
    }

    fn get_volume_elements(&self, _volume: MeshId) -> Vec<MeshId> {
        (0..self.tets.len() as MeshId).collect()
    }

    fn tet_vertices(&self, element: MeshId) -> [Point3; 4] {
        let conn = &self.tets[element as usize];
        [
            self.vertices[conn[0]],
            self.vertices[conn[1]],
            self.vertices[conn[2]],
            self.vertices[conn[3]],
        ]
    }

    fn bounding_box(&self, _volume: MeshId) -> Aabb3 {
        Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshtrace_math::Vec3;

    fn facet_normal(v: &[Point3; 3]) -> Vec3 {
        (v[1] - v[0]).cross(&(v[2] - v[0]))
    }

    #[test]
    fn test_mock_normals_point_outward() {
        let mm = MeshMock::new();
        let center = mm.bounding_box(0).center();
        for face in 0..12 {
            let verts = mm.triangle_vertices(face);
            let outward = verts[0] - center;
            assert!(
                facet_normal(&verts).dot(&outward) > 0.0,
                "face {face} normal points inward"
            );
        }
    }

    #[test]
    fn test_tet_cube_normals_point_outward() {
        let mm = TetCubeMock::new();
        let center = mm.bounding_box(0).center();
        for face in mm.get_surface_faces(0) {
            let verts = mm.triangle_vertices(face);
            let outward = verts[0] - center;
            assert!(
                facet_normal(&verts).dot(&outward) > 0.0,
                "face {face} normal points inward"
            );
        }
    }

    #[test]
    fn test_tet_cube_volumes_fill_cube() {
        let mm = TetCubeMock::new();
        // six tets of volume 1/6 each
        let mut total = 0.0;
        for element in mm.get_volume_elements(0) {
            let v = mm.tet_vertices(element);
            let vol = (v[1] - v[0]).cross(&(v[2] - v[0])).dot(&(v[3] - v[0])) / 6.0;
            total += vol.abs();
        }
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_surface_connectivity_round_trip() {
        let mm = MeshMock::new();
        for surface in mm.surfaces() {
            let verts = mm.get_surface_vertices(surface);
            let conn = mm.get_surface_connectivity(surface);
            assert_eq!(conn.len(), 6);
            let faces = mm.get_surface_faces(surface);
            for (k, face) in faces.iter().enumerate() {
                let direct = mm.triangle_vertices(*face);
                for i in 0..3 {
                    assert_eq!(verts[conn[3 * k + i]], direct[i]);
                }
            }
        }
    }
}
