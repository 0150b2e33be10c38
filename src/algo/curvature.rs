//! Discrete curvature statistics.
//!
//! - **Gaussian curvature** by angle deficit: `2π − Σ θ`, summed over the
//!   corner angles of the triangles incident to a vertex.
//! - **Dihedral angle** of an interior edge: the angle between the unit
//!   normals of its two triangles (0 for a flat edge).
//! - **Angle deviation** of a vertex: `sqrt(Σ (θ_e − mean θ)²)` over the
//!   incident edges that have exactly two triangles.
//!
//! # Example
//!
//! ```
//! use lapmesh::algo::curvature::{compute_curvature, gaussian_curvature};
//! use lapmesh::mesh::{build_from_triangles, Mesh, VertexId};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//! let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
//! mesh.create_edges_from_triangles().unwrap();
//!
//! compute_curvature(&mut mesh);
//! let k = mesh.vertex(VertexId::new(3)).curvature;
//! assert_eq!(k, gaussian_curvature(&mesh, VertexId::new(3)));
//! ```

use std::f64::consts::TAU;

use crate::mesh::{EdgeId, Mesh, MeshIndex, TriangleId, VertexId};

/// Interior angle of triangle `t` at its corner `v`.
///
/// Returns 0 if `v` is not a corner of `t` or the corner is degenerate.
pub fn corner_angle<I: MeshIndex>(mesh: &Mesh<I>, t: TriangleId<I>, v: VertexId<I>) -> f64 {
    let triangle = mesh.triangle(t);
    let Some(i) = triangle.corner(v) else {
        return 0.0;
    };
    let [p0, p1, p2] = mesh.triangle_positions(t);
    let (p, a, b) = match i {
        0 => (p0, p1, p2),
        1 => (p1, p2, p0),
        _ => (p2, p0, p1),
    };
    let e1 = a - p;
    let e2 = b - p;
    let denom = e1.norm() * e2.norm();
    if denom < 1e-300 {
        return 0.0;
    }
    (e1.dot(&e2) / denom).clamp(-1.0, 1.0).acos()
}

/// Angle-deficit Gaussian curvature at `v`.
pub fn gaussian_curvature<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> f64 {
    let total: f64 = mesh
        .vertex(v)
        .triangles()
        .iter()
        .map(|&t| corner_angle(mesh, t, v))
        .sum();
    TAU - total
}

/// Angle between the normals of the two triangles sharing `e`.
///
/// `None` unless the edge has exactly two triangles.
pub fn dihedral_angle<I: MeshIndex>(mesh: &Mesh<I>, e: EdgeId<I>) -> Option<f64> {
    match *mesh.edge(e).triangles() {
        [t1, t2] => {
            let n1 = mesh.triangle(t1).normal();
            let n2 = mesh.triangle(t2).normal();
            Some(n1.dot(&n2).clamp(-1.0, 1.0).acos())
        }
        _ => None,
    }
}

/// Root of the summed squared deviation of incident dihedral angles from their mean.
///
/// Uses the dihedral angles cached on the edges by [`compute_curvature`].
/// Zero when no incident edge has two triangles.
pub fn angle_deviation<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> f64 {
    let angles: Vec<f64> = mesh
        .vertex(v)
        .edges()
        .iter()
        .filter_map(|&e| mesh.edge(e).dihedral_angle())
        .collect();
    if angles.is_empty() {
        return 0.0;
    }
    let mean = angles.iter().sum::<f64>() / angles.len() as f64;
    angles
        .iter()
        .map(|a| (a - mean).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Compute and store dihedral angles on every edge, then curvature and angle
/// deviation on every vertex.
pub fn compute_curvature<I: MeshIndex>(mesh: &mut Mesh<I>) {
    let dihedrals: Vec<(EdgeId<I>, Option<f64>)> = mesh
        .edge_ids()
        .map(|e| (e, dihedral_angle(mesh, e)))
        .collect();
    for (e, angle) in dihedrals {
        mesh.edge_mut(e).dihedral = angle;
    }

    let stats: Vec<(VertexId<I>, f64, f64)> = mesh
        .vertex_ids()
        .map(|v| (v, gaussian_curvature(mesh, v), angle_deviation(mesh, v)))
        .collect();
    for (v, k, dev) in stats {
        let vertex = mesh.vertex_mut(v);
        vertex.curvature = k;
        vertex.angle_deviation = dev;
    }
}
