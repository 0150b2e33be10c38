//! The mesh arena.
//!
//! [`Mesh`] owns every vertex, edge, triangle and shape. Elements live in
//! slot vectors indexed by their id; removing an element empties its slot and
//! the id is never handed out again. All cross references are ids, and the
//! mesh keeps both directions of every link in sync.

use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{Point3, Vector3};

use super::entity::{Edge, Shape, Triangle, Vertex};
use super::index::{EdgeId, MeshIndex, ShapeId, TriangleId, VertexId};
use crate::error::{MeshError, Result};

/// An arena-backed triangle mesh with explicit edges.
#[derive(Debug, Clone)]
pub struct Mesh<I: MeshIndex = u32> {
    pub(crate) vertices: Vec<Option<Vertex<I>>>,
    pub(crate) edges: Vec<Option<Edge<I>>>,
    pub(crate) triangles: Vec<Option<Triangle<I>>>,
    pub(crate) shapes: Vec<Option<Shape<I>>>,

    num_vertices: usize,
    num_edges: usize,
    num_triangles: usize,
    num_shapes: usize,

    /// Translation removed by `move_to_centroid`.
    pub(crate) model_centroid: Vector3<f64>,
    /// Uniform factor applied by `scale_into_unit_sphere`.
    pub(crate) model_scale: f64,
}

impl<I: MeshIndex> Default for Mesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Key for edge lookups, independent of endpoint order.
#[inline]
pub(crate) fn edge_key<I: MeshIndex>(a: VertexId<I>, b: VertexId<I>) -> (VertexId<I>, VertexId<I>) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn missing(kind: &'static str, index: usize) -> MeshError {
    MeshError::MissingElement { kind, index }
}

/// Fail unless slot `len` can still be named by an `I` id.
fn check_capacity<I: MeshIndex>(kind: &'static str, len: usize) -> Result<()> {
    match I::try_from_usize(len) {
        Some(_) => Ok(()),
        None => Err(MeshError::IndexOverflow {
            kind,
            limit: I::MAX.to_usize() + 1,
        }),
    }
}

impl<I: MeshIndex> Mesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            triangles: Vec::new(),
            shapes: Vec::new(),
            num_vertices: 0,
            num_edges: 0,
            num_triangles: 0,
            num_shapes: 0,
            model_centroid: Vector3::zeros(),
            model_scale: 1.0,
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_triangles: usize) -> Self {
        // Closed manifold: E = 3F/2.
        let num_edges = num_triangles * 3 / 2 + num_triangles / 4;
        let mut mesh = Self::new();
        mesh.vertices.reserve(num_vertices);
        mesh.edges.reserve(num_edges);
        mesh.triangles.reserve(num_triangles);
        mesh
    }

    // ==================== Accessors ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Number of live edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Number of live triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.num_triangles
    }

    /// Number of live shapes.
    #[inline]
    pub fn num_shapes(&self) -> usize {
        self.num_shapes
    }

    /// Upper bound (exclusive) of vertex indices, including removed slots.
    ///
    /// Per-vertex scratch arrays are sized with this.
    #[inline]
    pub fn vertex_slots(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the mesh has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_vertices == 0
    }

    /// Get a vertex by id, if it is live.
    #[inline]
    pub fn try_vertex(&self, id: VertexId<I>) -> Option<&Vertex<I>> {
        self.vertices.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a vertex by id.
    ///
    /// # Panics
    /// Panics if the vertex was removed or never existed.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        match self.try_vertex(id) {
            Some(v) => v,
            None => panic!("vertex {:?} does not exist", id),
        }
    }

    /// Get a mutable vertex by id.
    ///
    /// # Panics
    /// Panics if the vertex was removed or never existed.
    #[inline]
    pub fn vertex_mut(&mut self, id: VertexId<I>) -> &mut Vertex<I> {
        match self.vertices.get_mut(id.index()).and_then(Option::as_mut) {
            Some(v) => v,
            None => panic!("vertex {:?} does not exist", id),
        }
    }

    /// Get an edge by id, if it is live.
    #[inline]
    pub fn try_edge(&self, id: EdgeId<I>) -> Option<&Edge<I>> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    /// Get an edge by id.
    ///
    /// # Panics
    /// Panics if the edge was removed or never existed.
    #[inline]
    pub fn edge(&self, id: EdgeId<I>) -> &Edge<I> {
        match self.try_edge(id) {
            Some(e) => e,
            None => panic!("edge {:?} does not exist", id),
        }
    }

    #[inline]
    pub(crate) fn edge_mut(&mut self, id: EdgeId<I>) -> &mut Edge<I> {
        match self.edges.get_mut(id.index()).and_then(Option::as_mut) {
            Some(e) => e,
            None => panic!("edge {:?} does not exist", id),
        }
    }

    /// Get a triangle by id, if it is live.
    #[inline]
    pub fn try_triangle(&self, id: TriangleId<I>) -> Option<&Triangle<I>> {
        self.triangles.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a triangle by id.
    ///
    /// # Panics
    /// Panics if the triangle was removed or never existed.
    #[inline]
    pub fn triangle(&self, id: TriangleId<I>) -> &Triangle<I> {
        match self.try_triangle(id) {
            Some(t) => t,
            None => panic!("triangle {:?} does not exist", id),
        }
    }

    /// Get a mutable triangle by id.
    ///
    /// Only texture coordinates are writable from outside the crate.
    #[inline]
    pub fn triangle_mut(&mut self, id: TriangleId<I>) -> &mut Triangle<I> {
        match self.triangles.get_mut(id.index()).and_then(Option::as_mut) {
            Some(t) => t,
            None => panic!("triangle {:?} does not exist", id),
        }
    }

    /// Get a shape by id, if it is live.
    #[inline]
    pub fn try_shape(&self, id: ShapeId<I>) -> Option<&Shape<I>> {
        self.shapes.get(id.index()).and_then(Option::as_ref)
    }

    /// Get a shape by id.
    ///
    /// # Panics
    /// Panics if the shape was removed or never existed.
    #[inline]
    pub fn shape(&self, id: ShapeId<I>) -> &Shape<I> {
        match self.try_shape(id) {
            Some(s) => s,
            None => panic!("shape {:?} does not exist", id),
        }
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertex(v).position
    }

    /// Set the position of a vertex.
    ///
    /// Cached edge and triangle properties are not refreshed; call
    /// [`recalculate_properties`](Self::recalculate_properties) afterwards.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertex_mut(v).position = pos;
    }

    /// Positions of the three corners of a triangle.
    pub fn triangle_positions(&self, t: TriangleId<I>) -> [Point3<f64>; 3] {
        let [a, b, c] = self.triangle(t).vertices;
        [*self.position(a), *self.position(b), *self.position(c)]
    }

    // ==================== Iteration ====================

    /// Iterate over live vertex ids in increasing order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .map(|(i, _)| VertexId::new(i))
    }

    /// Iterate over live vertices with their ids.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId<I>, &Vertex<I>)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (VertexId::new(i), v)))
    }

    /// Iterate over live edge ids in increasing order.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId<I>> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| EdgeId::new(i))
    }

    /// Iterate over live edges with their ids.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId<I>, &Edge<I>)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (EdgeId::new(i), e)))
    }

    /// Iterate over live triangle ids in increasing order.
    pub fn triangle_ids(&self) -> impl Iterator<Item = TriangleId<I>> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_some())
            .map(|(i, _)| TriangleId::new(i))
    }

    /// Iterate over live triangles with their ids.
    pub fn triangles(&self) -> impl Iterator<Item = (TriangleId<I>, &Triangle<I>)> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (TriangleId::new(i), t)))
    }

    /// Iterate over live shape ids in increasing order.
    pub fn shape_ids(&self) -> impl Iterator<Item = ShapeId<I>> + '_ {
        self.shapes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| ShapeId::new(i))
    }

    /// Iterate over live shapes with their ids.
    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId<I>, &Shape<I>)> + '_ {
        self.shapes
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (ShapeId::new(i), s)))
    }

    /// Find the edge joining `a` and `b`, in either direction.
    pub fn find_edge(&self, a: VertexId<I>, b: VertexId<I>) -> Option<EdgeId<I>> {
        let va = self.try_vertex(a)?;
        va.edges.iter().copied().find(|&e| self.edge(e).joins(a, b))
    }

    /// Triangles sharing a built edge with `t`, in edge-slot order.
    ///
    /// Empty until edges are built. A triangle sharing two edges with `t`
    /// is listed once.
    pub fn triangle_neighbors(&self, t: TriangleId<I>) -> Vec<TriangleId<I>> {
        let mut neighbors = Vec::new();
        for e in self.triangle(t).edges.into_iter().filter(|e| e.is_valid()) {
            for &other in &self.edge(e).triangles {
                if other != t && !neighbors.contains(&other) {
                    neighbors.push(other);
                }
            }
        }
        neighbors
    }

    /// Edge-adjacent triangles lying on the plane of `t`.
    ///
    /// Tolerances are those of [`Triangle::coplanar_with`].
    pub fn triangle_neighbors_on_plane(
        &self,
        t: TriangleId<I>,
        distance_tolerance: f64,
        orientation_tolerance: f64,
    ) -> Vec<TriangleId<I>> {
        let tri = self.triangle(t);
        self.triangle_neighbors(t)
            .into_iter()
            .filter(|&n| {
                tri.coplanar_with(self.triangle(n), distance_tolerance, orientation_tolerance)
            })
            .collect()
    }

    /// A neighbor of `t` whose plane the surrounding triangles agree on.
    ///
    /// With a single neighbor that neighbor is returned. Otherwise the first
    /// neighbor that is coplanar with a later one is returned, or `None`
    /// when no two neighbors share a plane.
    pub fn surrounding_plane(
        &self,
        t: TriangleId<I>,
        distance_tolerance: f64,
        orientation_tolerance: f64,
    ) -> Option<TriangleId<I>> {
        let neighbors = self.triangle_neighbors(t);
        if let [only] = neighbors[..] {
            return Some(only);
        }
        neighbors.iter().enumerate().find_map(|(i, &a)| {
            let ta = self.triangle(a);
            neighbors[i + 1..]
                .iter()
                .any(|&b| {
                    ta.coplanar_with(self.triangle(b), distance_tolerance, orientation_tolerance)
                })
                .then_some(a)
        })
    }

    // ==================== Insertion ====================

    /// Append a vertex and return its id.
    ///
    /// Fails with [`MeshError::IndexOverflow`] once every id of `I` is taken.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> Result<VertexId<I>> {
        check_capacity::<I>("vertex", self.vertices.len())?;
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Some(Vertex::new(position)));
        self.num_vertices += 1;
        Ok(id)
    }

    fn check_endpoints(&self, record: usize, vs: &[VertexId<I>]) -> Result<()> {
        for v in vs {
            if self.try_vertex(*v).is_none() {
                return Err(MeshError::InvalidVertexIndex {
                    face: record,
                    vertex: v.index(),
                });
            }
        }
        for (i, a) in vs.iter().enumerate() {
            if vs[i + 1..].contains(a) {
                return Err(MeshError::DegenerateFace { face: record });
            }
        }
        Ok(())
    }

    /// Append an edge between two distinct live vertices.
    ///
    /// No deduplication is done here; see
    /// [`create_edges_from_triangles`](Self::create_edges_from_triangles).
    pub fn add_edge(&mut self, a: VertexId<I>, b: VertexId<I>) -> Result<EdgeId<I>> {
        self.check_endpoints(self.edges.len(), &[a, b])?;
        self.insert_edge(a, b)
    }

    /// Append an edge whose endpoints are known to be valid.
    fn insert_edge(&mut self, a: VertexId<I>, b: VertexId<I>) -> Result<EdgeId<I>> {
        check_capacity::<I>("edge", self.edges.len())?;
        let id = EdgeId::new(self.edges.len());
        let edge = Edge::new(a, b, self.position(a), self.position(b));
        self.edges.push(Some(edge));
        self.num_edges += 1;

        for v in [a, b] {
            let vertex = self.vertex_mut(v);
            vertex.edges.push(id);
            vertex.neighbors_stale = true;
        }
        Ok(id)
    }

    /// Append a triangle over three distinct live vertices.
    ///
    /// The triangle's normal is added to the running normal of each corner.
    /// Edge slots stay invalid until edges are built.
    pub fn add_triangle(&mut self, vs: [VertexId<I>; 3]) -> Result<TriangleId<I>> {
        self.check_endpoints(self.triangles.len(), &vs)?;
        check_capacity::<I>("triangle", self.triangles.len())?;

        let id = TriangleId::new(self.triangles.len());
        let tri = Triangle::new(
            vs,
            [self.position(vs[0]), self.position(vs[1]), self.position(vs[2])],
        );
        let normal = tri.normal();
        self.triangles.push(Some(tri));
        self.num_triangles += 1;

        for v in vs {
            let vertex = self.vertex_mut(v);
            vertex.triangles.push(id);
            vertex.add_normal(&normal);
        }
        Ok(id)
    }

    /// Add an empty shape.
    pub fn add_shape(&mut self, texture: Option<String>) -> Result<ShapeId<I>> {
        let shape = match texture {
            Some(name) => Shape::new().with_texture(name),
            None => Shape::new(),
        };
        self.insert_shape(shape)
    }

    fn insert_shape(&mut self, shape: Shape<I>) -> Result<ShapeId<I>> {
        check_capacity::<I>("shape", self.shapes.len())?;
        let id = ShapeId::new(self.shapes.len());
        self.shapes.push(Some(shape));
        self.num_shapes += 1;
        Ok(id)
    }

    /// Attach a triangle, its corners and its built edges to a shape.
    pub fn attach_triangle_to_shape(&mut self, s: ShapeId<I>, t: TriangleId<I>) -> Result<()> {
        let tri = self
            .try_triangle(t)
            .ok_or_else(|| missing("triangle", t.index()))?;
        let (vs, es) = (tri.vertices, tri.edges);
        let shape = self
            .shapes
            .get_mut(s.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| missing("shape", s.index()))?;

        shape.push_triangle(t);
        for v in vs {
            shape.push_vertex(v);
        }
        for e in es.into_iter().filter(|e| e.is_valid()) {
            shape.push_edge(e);
        }
        Ok(())
    }

    /// Attach a single vertex to a shape.
    pub fn attach_vertex_to_shape(&mut self, s: ShapeId<I>, v: VertexId<I>) -> Result<()> {
        if self.try_vertex(v).is_none() {
            return Err(missing("vertex", v.index()));
        }
        let shape = self
            .shapes
            .get_mut(s.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| missing("shape", s.index()))?;
        shape.push_vertex(v);
        Ok(())
    }

    /// Record that edge `e` occupies `slot` of triangle `t`.
    fn link_triangle_edge(&mut self, t: TriangleId<I>, slot: usize, e: EdgeId<I>) {
        self.triangle_mut(t).edges[slot] = e;
        let edge = self.edge_mut(e);
        if !edge.triangles.contains(&t) {
            edge.triangles.push(t);
        }
    }

    // ==================== Removal ====================

    /// Remove a vertex.
    ///
    /// Fails with [`MeshError::VertexInUse`] while any edge or triangle still
    /// references it.
    pub fn remove_vertex(&mut self, v: VertexId<I>) -> Result<()> {
        let vertex = self.try_vertex(v).ok_or_else(|| missing("vertex", v.index()))?;
        if !vertex.edges.is_empty() || !vertex.triangles.is_empty() {
            return Err(MeshError::VertexInUse {
                vertex: v.index(),
                edges: vertex.edges.len(),
                triangles: vertex.triangles.len(),
            });
        }
        for shape in self.shapes.iter_mut().flatten() {
            shape.detach_vertex(v);
        }
        self.vertices[v.index()] = None;
        self.num_vertices -= 1;
        Ok(())
    }

    /// Remove an edge, unlinking it from its endpoints, triangles and shapes.
    pub fn remove_edge(&mut self, e: EdgeId<I>) -> Result<()> {
        let edge = self
            .edges
            .get_mut(e.index())
            .and_then(Option::take)
            .ok_or_else(|| missing("edge", e.index()))?;
        self.num_edges -= 1;

        for v in edge.vertices {
            let vertex = self.vertex_mut(v);
            vertex.edges.retain(|&x| x != e);
            vertex.neighbors_stale = true;
        }
        for t in edge.triangles {
            let tri = self.triangle_mut(t);
            for slot in tri.edges.iter_mut().filter(|slot| **slot == e) {
                *slot = EdgeId::invalid();
            }
        }
        for shape in self.shapes.iter_mut().flatten() {
            shape.detach_edge(e);
        }
        Ok(())
    }

    /// Remove a triangle, unlinking it from its corners, edges and shapes.
    ///
    /// The running normals of the corners are rebuilt from their remaining
    /// triangles.
    pub fn remove_triangle(&mut self, t: TriangleId<I>) -> Result<()> {
        let tri = self
            .triangles
            .get_mut(t.index())
            .and_then(Option::take)
            .ok_or_else(|| missing("triangle", t.index()))?;
        self.num_triangles -= 1;

        for e in tri.edges.into_iter().filter(|e| e.is_valid()) {
            if let Some(edge) = self.edges[e.index()].as_mut() {
                edge.triangles.retain(|&x| x != t);
                edge.dihedral = None;
            }
        }
        for v in tri.vertices {
            self.vertex_mut(v).triangles.retain(|&x| x != t);
            self.rebuild_vertex_normal(v);
        }
        for shape in self.shapes.iter_mut().flatten() {
            shape.detach_triangle(t);
        }
        Ok(())
    }

    /// Remove a shape. Its elements stay in the mesh.
    pub fn remove_shape(&mut self, s: ShapeId<I>) -> Result<()> {
        self.shapes
            .get_mut(s.index())
            .and_then(Option::take)
            .ok_or_else(|| missing("shape", s.index()))?;
        self.num_shapes -= 1;
        Ok(())
    }

    /// Remove everything and forget the normalization transform.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Recompute a vertex normal as the running sum over its triangles.
    pub(crate) fn rebuild_vertex_normal(&mut self, v: VertexId<I>) {
        let normals: Vec<Vector3<f64>> = self
            .vertex(v)
            .triangles
            .iter()
            .map(|&t| self.triangle(t).normal())
            .collect();
        let vertex = self.vertex_mut(v);
        vertex.normal = None;
        for n in &normals {
            vertex.add_normal(n);
        }
    }

    // ==================== Bulk topology ====================

    /// Append a copy of another mesh.
    ///
    /// Ids of the copied elements are remapped into this mesh; shapes and
    /// their textures are kept. The other mesh's normalization transform is
    /// not carried over. Returns the new id of each vertex slot of `other`.
    pub fn merge(&mut self, other: &Mesh<I>) -> Result<Vec<VertexId<I>>> {
        let mut vmap = vec![VertexId::invalid(); other.vertex_slots()];
        for (v, vertex) in other.vertices() {
            let nv = self.add_vertex(vertex.position)?;
            let copy = self.vertex_mut(nv);
            copy.reconstructed = vertex.reconstructed;
            copy.laplacian = vertex.laplacian;
            copy.quantized_laplacian = vertex.quantized_laplacian;
            copy.curvature = vertex.curvature;
            copy.angle_deviation = vertex.angle_deviation;
            vmap[v.index()] = nv;
        }

        let mut emap = vec![EdgeId::invalid(); other.edges.len()];
        for (e, edge) in other.edges() {
            let [a, b] = edge.vertices;
            emap[e.index()] = self.add_edge(vmap[a.index()], vmap[b.index()])?;
        }

        let mut tmap = vec![TriangleId::invalid(); other.triangles.len()];
        for (t, tri) in other.triangles() {
            let vs = tri.vertices.map(|v| vmap[v.index()]);
            let nt = self.add_triangle(vs)?;
            self.triangle_mut(nt).tex_coords = tri.tex_coords;
            for (slot, e) in tri.edges.iter().enumerate() {
                if e.is_valid() {
                    self.link_triangle_edge(nt, slot, emap[e.index()]);
                }
            }
            tmap[t.index()] = nt;
        }

        for (_, shape) in other.shapes() {
            let mut copy = match shape.texture() {
                Some(name) => Shape::new().with_texture(name),
                None => Shape::new(),
            };
            for v in shape.vertices() {
                copy.push_vertex(vmap[v.index()]);
            }
            for e in shape.edges() {
                copy.push_edge(emap[e.index()]);
            }
            for t in shape.triangles() {
                copy.push_triangle(tmap[t.index()]);
            }
            self.insert_shape(copy)?;
        }

        debug!(
            "merged mesh: +{} vertices, +{} edges, +{} triangles",
            other.num_vertices(),
            other.num_edges(),
            other.num_triangles()
        );
        Ok(vmap)
    }

    /// Build the edges of every triangle, one edge per unordered vertex pair.
    ///
    /// Existing edges are reused and triangle slots that are already linked
    /// are left alone, so calling this twice changes nothing. New edges join
    /// every shape that holds one of their triangles. Returns the number of
    /// edges created, or [`MeshError::IndexOverflow`] if the edge ids run out.
    pub fn create_edges_from_triangles(&mut self) -> Result<usize> {
        let mut lookup: HashMap<(VertexId<I>, VertexId<I>), EdgeId<I>> =
            HashMap::with_capacity(self.num_edges + self.num_triangles * 3 / 2);
        for (e, edge) in self.edges() {
            let [a, b] = edge.vertices;
            lookup.entry(edge_key(a, b)).or_insert(e);
        }

        let mut shapes_of: HashMap<TriangleId<I>, Vec<ShapeId<I>>> = HashMap::new();
        for (s, shape) in self.shapes() {
            for &t in shape.triangles() {
                shapes_of.entry(t).or_default().push(s);
            }
        }

        let triangle_ids: Vec<TriangleId<I>> = self.triangle_ids().collect();
        let mut created = 0;
        for t in triangle_ids {
            let tri = self.triangle(t);
            let [v0, v1, v2] = tri.vertices;
            let slots = tri.edges;

            for (slot, (a, b)) in [(v0, v1), (v0, v2), (v1, v2)].into_iter().enumerate() {
                if slots[slot].is_valid() {
                    continue;
                }
                let e = match lookup.get(&edge_key(a, b)) {
                    Some(&e) => e,
                    None => {
                        let e = self.insert_edge(a, b)?;
                        lookup.insert(edge_key(a, b), e);
                        created += 1;
                        e
                    }
                };
                self.link_triangle_edge(t, slot, e);

                if let Some(owners) = shapes_of.get(&t) {
                    for s in owners {
                        if let Some(shape) = self.shapes[s.index()].as_mut() {
                            shape.push_edge(e);
                        }
                    }
                }
            }
        }

        debug!("created {} edges from {} triangles", created, self.num_triangles);
        Ok(created)
    }

    /// Merge vertices that sit at exactly the same position.
    ///
    /// Vertices are compared with exact floating point equality (`-0.0`
    /// equals `0.0`, NaN never matches). Every reference to a duplicate is
    /// redirected to the first vertex seen at that position, then the
    /// duplicate is deleted. Edges that collapse are removed and parallel
    /// edges are merged; triangles that collapse are removed. Returns the
    /// number of removed vertices.
    pub fn weld_duplicate_vertices(&mut self) -> Result<usize> {
        let mut first_seen: HashMap<[u64; 3], VertexId<I>> = HashMap::new();
        let mut pairs = Vec::new();

        for (v, vertex) in self.vertices() {
            let p = vertex.position;
            if p.iter().any(|c| c.is_nan()) {
                continue;
            }
            // Adding 0.0 maps -0.0 to 0.0.
            let key = [(p.x + 0.0).to_bits(), (p.y + 0.0).to_bits(), (p.z + 0.0).to_bits()];
            match first_seen.get(&key) {
                Some(&keep) => pairs.push((v, keep)),
                None => {
                    first_seen.insert(key, v);
                }
            }
        }

        let mut collapsed = 0;
        for &(dup, keep) in &pairs {
            collapsed += self.redirect_vertex(dup, keep)?;
        }
        if collapsed > 0 {
            warn!("welding removed {} collapsed triangles", collapsed);
        }
        debug!("welded {} duplicate vertices", pairs.len());
        Ok(pairs.len())
    }

    /// Move every reference of `dup` onto `keep` and delete `dup`.
    ///
    /// Returns the number of triangles removed because they collapsed.
    fn redirect_vertex(&mut self, dup: VertexId<I>, keep: VertexId<I>) -> Result<usize> {
        let dup_edges = self.vertex(dup).edges.clone();
        for e in dup_edges {
            let other = self.edge(e).other(dup);
            if other == keep {
                // Collapsed to a point. Slots of its triangles become invalid.
                self.remove_edge(e)?;
            } else if let Some(existing) = self.find_edge(keep, other) {
                let tris = self.edge(e).triangles.clone();
                for t in tris {
                    for slot in 0..3 {
                        if self.triangle(t).edges[slot] == e {
                            self.link_triangle_edge(t, slot, existing);
                        }
                    }
                }
                self.edge_mut(e).triangles.clear();
                self.remove_edge(e)?;
            } else {
                self.edge_mut(e).replace_vertex(dup, keep);
                self.vertex_mut(keep).edges.push(e);
                self.vertex_mut(other).neighbors_stale = true;
            }
        }

        let mut collapsed = 0;
        let dup_tris = self.vertex(dup).triangles.clone();
        for t in dup_tris {
            if self.triangle(t).contains(keep) {
                self.remove_triangle(t)?;
                collapsed += 1;
            } else {
                let normal = self.triangle(t).normal();
                self.triangle_mut(t).replace_vertex(dup, keep);
                let vertex = self.vertex_mut(keep);
                vertex.triangles.push(t);
                vertex.add_normal(&normal);
            }
        }

        for shape in self.shapes.iter_mut().flatten() {
            shape.replace_vertex(dup, keep);
        }

        self.vertex_mut(keep).neighbors_stale = true;
        self.vertices[dup.index()] = None;
        self.num_vertices -= 1;
        Ok(collapsed)
    }

    // ==================== Neighbors ====================

    /// Rebuild the adjacency list of `v` from its incident edges.
    ///
    /// Each neighbor appears once, in edge order. Calling this again on an
    /// unchanged vertex gives the same list.
    pub fn compute_neighbors(&mut self, v: VertexId<I>) {
        let mut neighbors: Vec<VertexId<I>> = Vec::with_capacity(self.vertex(v).edges.len());
        for &e in &self.vertex(v).edges {
            let other = self.edge(e).other(v);
            if !neighbors.contains(&other) {
                neighbors.push(other);
            }
        }
        let vertex = self.vertex_mut(v);
        vertex.neighbors = neighbors;
        vertex.neighbors_stale = false;
    }

    /// Rebuild the adjacency list of every vertex.
    pub fn compute_all_neighbors(&mut self) {
        let ids: Vec<VertexId<I>> = self.vertex_ids().collect();
        for v in ids {
            self.compute_neighbors(v);
        }
    }

    /// Rebuild only the adjacency lists invalidated by edge changes.
    pub fn refresh_neighbors(&mut self) {
        let stale: Vec<VertexId<I>> = self
            .vertices()
            .filter(|(_, vertex)| vertex.neighbors_stale)
            .map(|(v, _)| v)
            .collect();
        for v in stale {
            self.compute_neighbors(v);
        }
    }

    /// Cached adjacency list of `v`.
    ///
    /// Empty until [`compute_neighbors`](Self::compute_neighbors) has run.
    #[inline]
    pub fn neighbors(&self, v: VertexId<I>) -> &[VertexId<I>] {
        &self.vertex(v).neighbors
    }

    /// Whether every adjacency list matches the current edges.
    pub fn neighbors_ready(&self) -> bool {
        self.vertices().all(|(_, vertex)| !vertex.neighbors_stale)
    }

    /// Error out unless every adjacency list is current.
    pub(crate) fn require_neighbors(&self) -> Result<()> {
        if self.neighbors_ready() {
            Ok(())
        } else {
            Err(MeshError::InvalidState(
                "vertex neighbors are out of date; call compute_all_neighbors".into(),
            ))
        }
    }

    /// Dense index for each vertex slot (live vertices in id order).
    ///
    /// Returns the column of each slot (`usize::MAX` for removed slots) and
    /// the live ids in column order.
    pub(crate) fn dense_columns(&self) -> (Vec<usize>, Vec<VertexId<I>>) {
        let mut column = vec![usize::MAX; self.vertex_slots()];
        let mut ids = Vec::with_capacity(self.num_vertices);
        for v in self.vertex_ids() {
            column[v.index()] = ids.len();
            ids.push(v);
        }
        (column, ids)
    }
}
