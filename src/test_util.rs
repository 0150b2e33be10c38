//! Shared mesh fixtures for unit tests.

use nalgebra::Point3;

use crate::mesh::{build_from_data, build_from_triangles, Mesh, MeshData};

/// Unit cube, 8 vertices and 12 outward-facing triangles. Edges are not built.
pub fn cube() -> Mesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [1, 2, 6],
        [1, 6, 5],
        [2, 3, 7],
        [2, 7, 6],
        [3, 0, 4],
        [3, 4, 7],
    ];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Regular tetrahedron-like closed mesh. Edges are not built.
pub fn tetrahedron() -> Mesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.5, 1.0, 0.0),
        Point3::new(0.5, 0.5, 1.0),
    ];
    let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
    build_from_triangles(&vertices, &faces).unwrap()
}

/// Two triangles forming a unit square in the z = 0 plane. Edges are not built.
pub fn open_square() -> Mesh {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap()
}

/// `n` x `n` vertex grid in the z = 0 plane with a bump in z, triangulated.
pub fn grid_data(n: usize) -> MeshData {
    let mut positions = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            let x = i as f64 / (n - 1) as f64;
            let y = j as f64 / (n - 1) as f64;
            let z = 0.25 * ((x * 3.0).sin() * (y * 2.0).cos());
            positions.push(Point3::new(x, y, z));
        }
    }
    let mut triangles = Vec::with_capacity(2 * (n - 1) * (n - 1));
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let a = j * n + i;
            let b = a + 1;
            let c = a + n;
            let d = c + 1;
            triangles.push([a, b, d]);
            triangles.push([a, d, c]);
        }
    }
    MeshData::new(positions, triangles)
}

/// Grid mesh with edges and neighbors ready.
pub fn grid(n: usize) -> Mesh {
    let mut mesh: Mesh = build_from_data(&grid_data(n)).unwrap();
    mesh.create_edges_from_triangles().unwrap();
    mesh.compute_all_neighbors();
    mesh
}

/// Cube with edges and neighbors ready.
pub fn connected_cube() -> Mesh {
    let mut mesh = cube();
    mesh.create_edges_from_triangles().unwrap();
    mesh.compute_all_neighbors();
    mesh
}

/// Two disjoint tetrahedra with edges and neighbors ready.
pub fn two_components() -> Mesh {
    let mut mesh = tetrahedron();
    let other = tetrahedron();
    mesh.merge(&other).unwrap();
    let offset = nalgebra::Vector3::new(5.0, 0.0, 0.0);
    for v in 4..8 {
        let id = crate::mesh::VertexId::new(v);
        let p = *mesh.position(id) + offset;
        mesh.set_position(id, p);
    }
    mesh.recalculate_properties();
    mesh.create_edges_from_triangles().unwrap();
    mesh.compute_all_neighbors();
    mesh
}
