//! Error types for lapmesh.
//!
//! This module defines all error types used throughout the library.
//! Numerical failures of the reconstruction solver are grouped in
//! [`SolveError`] so callers can tell them apart from bad input.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no vertices or faces to work on.
    #[error("mesh is empty")]
    EmptyMesh,

    /// A face or edge references an invalid (removed or unknown) vertex.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face (or edge) index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices (degenerate triangle or edge).
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// An id does not refer to a live element of the mesh.
    #[error("{kind} {index} does not exist in this mesh")]
    MissingElement {
        /// Kind of element ("vertex", "edge", "triangle", "shape").
        kind: &'static str,
        /// The raw index.
        index: usize,
    },

    /// A vertex cannot be removed while edges or triangles still use it.
    #[error("vertex {vertex} is still referenced by {edges} edges and {triangles} triangles")]
    VertexInUse {
        /// The vertex index.
        vertex: usize,
        /// Number of incident edges.
        edges: usize,
        /// Number of incident triangles.
        triangles: usize,
    },

    /// The mesh already holds as many elements of a kind as its index type can address.
    #[error("cannot add another {kind}: index type addresses at most {limit}")]
    IndexOverflow {
        /// Kind of element ("vertex", "edge", "triangle", "shape").
        kind: &'static str,
        /// Number of addressable slots.
        limit: usize,
    },

    /// A PLY file is malformed (bad header, bad vertex list, binary encoding).
    #[error("PLY file format error: {message}")]
    PlyFormat {
        /// Description of the problem.
        message: String,
    },

    /// A PLY face record with two indices (an edge) is malformed.
    #[error("PLY file format error: edge record {record}: {message}")]
    PlyEdge {
        /// Zero-based face record number.
        record: usize,
        /// Description of the problem.
        message: String,
    },

    /// A PLY face record with three indices (a triangle) is malformed.
    #[error("PLY file format error: triangle record {record}: {message}")]
    PlyTriangle {
        /// Zero-based face record number.
        record: usize,
        /// Description of the problem.
        message: String,
    },

    /// A PLY face record references a vertex past the declared vertex count.
    #[error("PLY file format error: vertex index out of range ({index} >= {count}) in face record {record}")]
    VertexIndexOutOfRange {
        /// Zero-based face record number.
        record: usize,
        /// The offending index.
        index: usize,
        /// Number of vertices declared in the header.
        count: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading mesh from file.
    #[error("failed to load mesh from {path}: {source}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        source: Box<MeshError>,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid mesh state for the requested operation.
    #[error("invalid mesh state: {0}")]
    InvalidState(String),

    /// The reconstruction solver failed.
    #[error("solve failed: {0}")]
    Solve(#[from] SolveError),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

/// Numerical failures of the sparse reconstruction solver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// The system has no anchor rows, so positions are only known up to a translation.
    #[error("no anchor vertices were given")]
    NoAnchors,

    /// A vertex without neighbors and without an anchor produces an all-zero row.
    #[error("vertex {vertex} is isolated and not anchored")]
    IsolatedVertex {
        /// The vertex index.
        vertex: usize,
    },

    /// A connected component contains no anchor, so the system is singular.
    #[error("connected component containing vertex {vertex} has no anchor")]
    UnanchoredComponent {
        /// Lowest vertex index of the component.
        vertex: usize,
    },

    /// The factorization hit a zero pivot.
    #[error("system matrix is singular")]
    Singular,

    /// The opt-in conjugate gradient solver did not reach the requested tolerance.
    #[error("conjugate gradient did not converge after {iterations} iterations (relative residual {residual:e})")]
    NotConverged {
        /// Number of iterations attempted.
        iterations: usize,
        /// Relative residual at the last iteration.
        residual: f64,
    },

    /// The solution contains NaN or infinite values.
    #[error("solution contains non-finite values")]
    NonFinite,
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Process exit status for this error.
    ///
    /// Format errors keep the status codes of the classic PLY reader
    /// (3 for header and vertex list problems, 6 for edge records, 7 for
    /// triangle records, 8 for out-of-range vertex indices).
    pub fn exit_code(&self) -> i32 {
        match self {
            MeshError::PlyFormat { .. } => 3,
            MeshError::PlyEdge { .. } => 6,
            MeshError::PlyTriangle { .. } => 7,
            MeshError::VertexIndexOutOfRange { .. } => 8,
            MeshError::Io(_) => 2,
            MeshError::LoadError { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            MeshError::PlyFormat {
                message: "x".into(),
            },
            MeshError::PlyEdge {
                record: 0,
                message: "x".into(),
            },
            MeshError::PlyTriangle {
                record: 0,
                message: "x".into(),
            },
            MeshError::VertexIndexOutOfRange {
                record: 0,
                index: 5,
                count: 3,
            },
        ];
        let codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes, vec![3, 6, 7, 8]);
    }

    #[test]
    fn test_load_error_keeps_inner_code() {
        let err = MeshError::LoadError {
            path: PathBuf::from("a.ply"),
            source: Box::new(MeshError::VertexIndexOutOfRange {
                record: 0,
                index: 5,
                count: 3,
            }),
        };
        assert_eq!(err.exit_code(), 8);
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_solve_error_converts() {
        let err: MeshError = SolveError::NoAnchors.into();
        assert!(matches!(err, MeshError::Solve(SolveError::NoAnchors)));
        assert_eq!(err.exit_code(), 1);
    }
}
