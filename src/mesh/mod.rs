//! Core mesh data structures.
//!
//! This module provides the arena mesh representation used by every
//! algorithm in the crate.
//!
//! # Overview
//!
//! The primary type is [`Mesh`], an owning arena of [`Vertex`], [`Edge`],
//! [`Triangle`] and [`Shape`] entities. Entities refer to each other by id,
//! and the mesh keeps both sides of every link consistent when elements are
//! added, removed, welded or merged.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`EdgeId`] - Identifies an edge
//! - [`TriangleId`] - Identifies a triangle
//! - [`ShapeId`] - Identifies a shape
//!
//! These indices are generic over the underlying integer type ([`MeshIndex`] trait),
//! allowing you to choose `u16`, `u32`, or `u64` based on mesh size.
//!
//! # Construction
//!
//! Meshes are typically built from file I/O or from index lists:
//!
//! ```
//! use lapmesh::mesh::{build_from_triangles, Mesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
//! mesh.create_edges_from_triangles().unwrap();
//! mesh.compute_all_neighbors();
//! ```

mod builder;
mod entity;
mod index;
mod topology;
mod transform;

pub use builder::{build_from_data, build_from_triangles, to_data, MeshData, PositionSource};
pub use entity::{Edge, Shape, Triangle, Vertex};
pub use index::{EdgeId, MeshIndex, ShapeId, TriangleId, VertexId};
pub use topology::Mesh;
