//! # lapmesh
//!
//! Triangle mesh topology and Laplacian-coordinate mesh compression.
//!
//! lapmesh keeps a mesh as an arena of vertices, edges, triangles and shapes
//! linked by typed ids, and compresses its geometry by transmitting quantized
//! differential (Laplacian) coordinates plus a small set of exact anchor
//! positions. Positions are recovered with a sparse least-squares solve.
//!
//! ## Features
//!
//! - **Arena topology**: deduplicated edges, vertex welding, merging, removal
//! - **Flexible indexing**: Support for 16-bit, 32-bit, and 64-bit indices
//! - **Laplacian coordinates**: umbrella operator with error-bounded quantization
//! - **Anchor selection**: greedy maximum-error and BFS distance layering
//! - **Reconstruction**: global or block-wise least squares (dense QR or sparse Cholesky)
//! - **Quality metrics**: Mq, Sq, Evis and approximate Hausdorff distances
//! - **PLY I/O**: ASCII reader and writer, optional vertex colors
//!
//! ## Quick Start
//!
//! ```no_run
//! use lapmesh::prelude::*;
//! use lapmesh::algo::pipeline::{compress, CompressionOptions};
//! use lapmesh::algo::Progress;
//!
//! let mut mesh: Mesh = lapmesh::io::load("model.ply").unwrap();
//! let report = compress(&mut mesh, &CompressionOptions::default(), &Progress::none()).unwrap();
//! println!("Mq = {}, anchors = {}", report.quality.mq, report.anchors.len());
//!
//! lapmesh::io::save(&mesh, "reconstructed.ply", PositionSource::Reconstructed).unwrap();
//! ```
//!
//! ## Step by Step
//!
//! ```
//! use lapmesh::prelude::*;
//! use lapmesh::algo::laplacian::{compute_laplacian_coordinates, quantize_laplacian};
//! use lapmesh::algo::reconstruct::{reconstruct, ReconstructOptions};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//!
//! let faces = vec![
//!     [0, 2, 1],  // bottom
//!     [0, 1, 3],  // front
//!     [1, 2, 3],  // right
//!     [2, 0, 3],  // left
//! ];
//!
//! let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert_eq!(mesh.create_edges_from_triangles().unwrap(), 6);
//! mesh.compute_all_neighbors();
//!
//! compute_laplacian_coordinates(&mut mesh).unwrap();
//! let quantizer = quantize_laplacian(&mut mesh, 12).unwrap();
//! reconstruct(&mut mesh, &[VertexId::new(0)], &ReconstructOptions::default()).unwrap();
//!
//! let v = mesh.vertex(VertexId::new(3));
//! assert!((v.reconstructed - v.position).norm() < 1e-2);
//! # let _ = quantizer;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod io;
pub mod mesh;

#[cfg(test)]
mod test_util;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use lapmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{MeshError, Result, SolveError};
    pub use crate::mesh::{
        build_from_data, build_from_triangles, to_data, Edge, EdgeId, Mesh, MeshData,
        MeshIndex, PositionSource, Shape, ShapeId, Triangle, TriangleId, Vertex, VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_octahedron_topology() {
        let vertices = [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, -1.0),
        ];
        let faces = [
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];

        let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_vertices(), 6);
        assert_eq!(mesh.num_triangles(), 8);

        assert_eq!(mesh.create_edges_from_triangles().unwrap(), 12);
        assert!(mesh.edges().all(|(_, e)| e.triangles().len() == 2));

        mesh.compute_all_neighbors();
        for v in mesh.vertex_ids() {
            assert_eq!(mesh.neighbors(v).len(), 4, "{:?}", v);
        }
    }
}
