//! Mesh construction utilities.
//!
//! This module converts between the arena [`Mesh`] and [`MeshData`], the
//! plain index-list form that file formats read and write.

use nalgebra::Point3;

use super::index::{MeshIndex, VertexId};
use super::topology::Mesh;
use crate::error::{MeshError, Result};

/// In-memory mesh geometry as produced and consumed by file formats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertex positions.
    pub positions: Vec<Point3<f64>>,
    /// Triangles as vertex index triples.
    pub triangles: Vec<[usize; 3]>,
    /// Standalone edges as vertex index pairs.
    pub edges: Vec<[usize; 2]>,
    /// Optional per-vertex RGBA color.
    pub colors: Option<Vec<[u8; 4]>>,
}

impl MeshData {
    /// Create geometry from positions and triangles.
    pub fn new(positions: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self {
            positions,
            triangles,
            edges: Vec::new(),
            colors: None,
        }
    }

    /// Attach per-vertex colors.
    pub fn with_colors(mut self, colors: Vec<[u8; 4]>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }
}

/// Which vertex position [`to_data`] exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionSource {
    /// Current (possibly normalized) positions.
    #[default]
    Position,
    /// Reconstructed positions.
    Reconstructed,
    /// Current positions mapped back through the normalization transform.
    OriginalFrame,
    /// Reconstructed positions mapped back through the normalization transform.
    ReconstructedOriginalFrame,
}

/// Build a mesh from index lists.
///
/// Vertices, standalone edges and triangles are added in input order, so the
/// id of each element equals its input index. All triangles and vertices go
/// into a single shape. Triangle edges are not built; call
/// [`Mesh::create_edges_from_triangles`] for that.
///
/// # Example
/// ```
/// use lapmesh::mesh::{build_from_data, Mesh, MeshData};
/// use nalgebra::Point3;
///
/// let data = MeshData::new(
///     vec![
///         Point3::new(0.0, 0.0, 0.0),
///         Point3::new(1.0, 0.0, 0.0),
///         Point3::new(0.5, 1.0, 0.0),
///     ],
///     vec![[0, 1, 2]],
/// );
///
/// let mut mesh: Mesh = build_from_data(&data).unwrap();
/// mesh.create_edges_from_triangles().unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_edges(), 3);
/// ```
pub fn build_from_data<I: MeshIndex>(data: &MeshData) -> Result<Mesh<I>> {
    if data.positions.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    let n = data.positions.len();
    for (ei, edge) in data.edges.iter().enumerate() {
        if let Some(&vi) = edge.iter().find(|&&vi| vi >= n) {
            return Err(MeshError::InvalidVertexIndex { face: ei, vertex: vi });
        }
        if edge[0] == edge[1] {
            return Err(MeshError::DegenerateFace { face: ei });
        }
    }
    for (fi, face) in data.triangles.iter().enumerate() {
        if let Some(&vi) = face.iter().find(|&&vi| vi >= n) {
            return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(MeshError::DegenerateFace { face: fi });
        }
    }

    let mut mesh = Mesh::with_capacity(n, data.triangles.len());
    let ids: Vec<VertexId<I>> = data
        .positions
        .iter()
        .map(|&p| mesh.add_vertex(p))
        .collect::<Result<_>>()?;

    let shape = mesh.add_shape(None)?;
    for &v in &ids {
        mesh.attach_vertex_to_shape(shape, v)?;
    }
    for &[a, b] in &data.edges {
        mesh.add_edge(ids[a], ids[b])?;
    }
    for &[a, b, c] in &data.triangles {
        let t = mesh.add_triangle([ids[a], ids[b], ids[c]])?;
        mesh.attach_triangle_to_shape(shape, t)?;
    }

    Ok(mesh)
}

/// Build a mesh from vertex positions and triangle faces.
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<Mesh<I>> {
    build_from_data(&MeshData::new(vertices.to_vec(), faces.to_vec()))
}

/// Convert a mesh back into index lists.
///
/// Removed vertex slots are compacted away, so indices are dense. Only edges
/// without incident triangles are listed in `edges`.
pub fn to_data<I: MeshIndex>(mesh: &Mesh<I>, source: PositionSource) -> MeshData {
    let (column, ids) = mesh.dense_columns();

    let positions = ids
        .iter()
        .map(|&v| {
            let vertex = mesh.vertex(v);
            match source {
                PositionSource::Position => vertex.position,
                PositionSource::Reconstructed => vertex.reconstructed,
                PositionSource::OriginalFrame => mesh.to_original(&vertex.position),
                PositionSource::ReconstructedOriginalFrame => {
                    mesh.to_original(&vertex.reconstructed)
                }
            }
        })
        .collect();

    let triangles = mesh
        .triangles()
        .map(|(_, t)| t.vertices().map(|v| column[v.index()]))
        .collect();

    let edges = mesh
        .edges()
        .filter(|(_, e)| e.triangles().is_empty())
        .map(|(_, e)| e.vertices().map(|v| column[v.index()]))
        .collect();

    MeshData {
        positions,
        triangles,
        edges,
        colors: None,
    }
}
