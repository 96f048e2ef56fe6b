//! Mesh builders shared by the integration tests

#![allow(dead_code)]

use mddlme_core::{Point3f, TriangleMesh};
use std::collections::HashMap;

/// Unit cube: 8 vertices, 12 outward-facing triangles
pub fn unit_cube() -> TriangleMesh {
    subdivided_cube(1)
}

/// Surface of the unit cube with every face split into `n x n` quads.
/// Vertices on shared edges are welded, giving `6n² + 2` vertices and
/// `12n²` faces.
pub fn subdivided_cube(n: usize) -> TriangleMesh {
    let mut index: HashMap<[usize; 3], usize> = HashMap::new();
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    let scale = 1.0 / n as f32;

    let mut vertex = |lattice: [usize; 3], vertices: &mut Vec<Point3f>| -> usize {
        *index.entry(lattice).or_insert_with(|| {
            vertices.push(Point3f::new(
                lattice[0] as f32 * scale,
                lattice[1] as f32 * scale,
                lattice[2] as f32 * scale,
            ));
            vertices.len() - 1
        })
    };

    for axis in 0..3 {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        for side in [0, n] {
            for i in 0..n {
                for j in 0..n {
                    let mut corners = [0usize; 4];
                    for (k, (di, dj)) in [(0, 0), (1, 0), (0, 1), (1, 1)].into_iter().enumerate() {
                        let mut lattice = [0usize; 3];
                        lattice[axis] = side;
                        lattice[u] = i + di;
                        lattice[v] = j + dj;
                        corners[k] = vertex(lattice, &mut vertices);
                    }
                    let [a, b, c, d] = corners;
                    if side == n {
                        faces.push([a, b, c]);
                        faces.push([b, d, c]);
                    } else {
                        faces.push([a, c, b]);
                        faces.push([b, c, d]);
                    }
                }
            }
        }
    }

    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

/// Flat `n x n` vertex grid in the z = 0 plane
pub fn plane_grid(n: usize) -> TriangleMesh {
    height_grid(n, |_, _| 0.0)
}

/// `n x n` vertex grid over the unit square with a smooth bump
pub fn wavy_grid(n: usize) -> TriangleMesh {
    height_grid(n, |x, y| {
        0.25 * (x * std::f32::consts::PI).sin() * (y * std::f32::consts::PI).sin()
    })
}

fn height_grid(n: usize, height: impl Fn(f32, f32) -> f32) -> TriangleMesh {
    let step = 1.0 / (n - 1) as f32;
    let mut vertices = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let (fx, fy) = (x as f32 * step, y as f32 * step);
            vertices.push(Point3f::new(fx, fy, height(fx, fy)));
        }
    }
    let mut faces = Vec::with_capacity((n - 1) * (n - 1) * 2);
    for y in 0..n - 1 {
        for x in 0..n - 1 {
            let tl = y * n + x;
            let tr = tl + 1;
            let bl = tl + n;
            let br = bl + 1;
            faces.push([tl, tr, bl]);
            faces.push([tr, br, bl]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

/// Every face index is in range.
pub fn assert_indices_valid(mesh: &TriangleMesh) {
    let n = mesh.vertex_count();
    for (fi, face) in mesh.faces.iter().enumerate() {
        assert!(
            face.iter().all(|&v| v < n),
            "face {} {:?} out of range for {} vertices",
            fi,
            face,
            n
        );
    }
}

/// Triangles as sorted position triples, for comparisons that ignore
/// vertex numbering and winding.
pub fn triangle_set(mesh: &TriangleMesh) -> Vec<[[u32; 3]; 3]> {
    let mut set: Vec<[[u32; 3]; 3]> = mesh
        .faces
        .iter()
        .map(|f| {
            let mut tri = f.map(|v| {
                let p = mesh.vertices[v];
                [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
            });
            tri.sort();
            tri
        })
        .collect();
    set.sort();
    set
}
