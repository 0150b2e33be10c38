//! Mesh graph entities.
//!
//! Vertices, edges, triangles and shapes reference each other by id. The
//! [`Mesh`](super::Mesh) arena owns all of them and keeps the back-references
//! consistent; the entities themselves only hold ids and cached geometry.
//!
//! Derived properties (lengths, normals, centroids, areas) are cached. They are
//! refreshed by the mesh's `recalculate_*` methods, never lazily on read.

use std::collections::HashSet;

use nalgebra::{Point2, Point3, Vector3};

use super::index::{EdgeId, MeshIndex, TriangleId, VertexId};

/// A vertex of the mesh graph.
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// Position computed by the most recent reconstruction.
    pub reconstructed: Point3<f64>,

    /// Uniform Laplacian (differential) coordinate.
    pub laplacian: Vector3<f64>,

    /// Quantized Laplacian coordinate.
    pub quantized_laplacian: Vector3<f64>,

    /// Angle-deficit Gaussian curvature.
    pub curvature: f64,

    /// Spread of the dihedral angles of the incident edges.
    pub angle_deviation: f64,

    pub(crate) normal: Option<Vector3<f64>>,
    pub(crate) edges: Vec<EdgeId<I>>,
    pub(crate) triangles: Vec<TriangleId<I>>,
    pub(crate) neighbors: Vec<VertexId<I>>,
    pub(crate) neighbors_stale: bool,
}

impl<I: MeshIndex> Vertex<I> {
    /// Create a new isolated vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            reconstructed: position,
            laplacian: Vector3::zeros(),
            quantized_laplacian: Vector3::zeros(),
            curvature: 0.0,
            angle_deviation: 0.0,
            normal: None,
            edges: Vec::new(),
            triangles: Vec::new(),
            neighbors: Vec::new(),
            neighbors_stale: true,
        }
    }

    /// Create a new vertex from coordinates.
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Accumulated normal of the incident triangles, if any were attached.
    #[inline]
    pub fn normal(&self) -> Option<&Vector3<f64>> {
        self.normal.as_ref()
    }

    /// Adds a triangle normal to the running sum and renormalizes.
    ///
    /// The result depends on the attachment order.
    pub(crate) fn add_normal(&mut self, n: &Vector3<f64>) {
        let sum = match self.normal {
            Some(acc) => acc + n,
            None => *n,
        };
        self.normal = Some(sum.try_normalize(0.0).unwrap_or(sum));
    }

    /// Incident edges.
    #[inline]
    pub fn edges(&self) -> &[EdgeId<I>] {
        &self.edges
    }

    /// Incident triangles.
    #[inline]
    pub fn triangles(&self) -> &[TriangleId<I>] {
        &self.triangles
    }

    /// Number of incident edges.
    #[inline]
    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    /// Euclidean distance between two vertices.
    #[inline]
    pub fn distance(&self, other: &Vertex<I>) -> f64 {
        (self.position - other.position).norm()
    }

    /// Exact position equality.
    #[inline]
    pub fn same_position(&self, other: &Vertex<I>) -> bool {
        self.position == other.position
    }
}

/// An undirected edge between two distinct vertices.
#[derive(Debug, Clone)]
pub struct Edge<I: MeshIndex = u32> {
    pub(crate) vertices: [VertexId<I>; 2],
    pub(crate) triangles: Vec<TriangleId<I>>,
    length: f64,
    midpoint: Point3<f64>,
    direction: Vector3<f64>,
    pub(crate) dihedral: Option<f64>,
}

impl<I: MeshIndex> Edge<I> {
    pub(crate) fn new(a: VertexId<I>, b: VertexId<I>, pa: &Point3<f64>, pb: &Point3<f64>) -> Self {
        let mut edge = Self {
            vertices: [a, b],
            triangles: Vec::new(),
            length: 0.0,
            midpoint: Point3::origin(),
            direction: Vector3::zeros(),
            dihedral: None,
        };
        edge.calc_properties(pa, pb);
        edge
    }

    /// Refresh the cached length, midpoint and direction.
    pub(crate) fn calc_properties(&mut self, pa: &Point3<f64>, pb: &Point3<f64>) {
        let d = pa - pb;
        self.midpoint = Point3::from((pa.coords + pb.coords) * 0.5);
        self.length = d.norm();
        self.direction = d.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
    }

    /// The two endpoints.
    #[inline]
    pub fn vertices(&self) -> [VertexId<I>; 2] {
        self.vertices
    }

    /// Incident triangles (two for an interior manifold edge, one on a boundary).
    #[inline]
    pub fn triangles(&self) -> &[TriangleId<I>] {
        &self.triangles
    }

    /// Cached length.
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Cached midpoint.
    #[inline]
    pub fn midpoint(&self) -> Point3<f64> {
        self.midpoint
    }

    /// Cached unit direction, pointing from the second endpoint to the first.
    #[inline]
    pub fn direction(&self) -> Vector3<f64> {
        self.direction
    }

    /// Angle between the normals of the two incident triangles, once computed.
    #[inline]
    pub fn dihedral_angle(&self) -> Option<f64> {
        self.dihedral
    }

    /// Whether this edge connects `a` and `b`, in either order.
    #[inline]
    pub fn joins(&self, a: VertexId<I>, b: VertexId<I>) -> bool {
        (self.vertices[0] == a && self.vertices[1] == b)
            || (self.vertices[0] == b && self.vertices[1] == a)
    }

    /// Order-independent equality of the endpoints.
    #[inline]
    pub fn same_endpoints(&self, other: &Edge<I>) -> bool {
        self.joins(other.vertices[0], other.vertices[1])
    }

    /// The endpoint that is not `v`.
    #[inline]
    pub fn other(&self, v: VertexId<I>) -> VertexId<I> {
        if self.vertices[0] == v {
            self.vertices[1]
        } else {
            self.vertices[0]
        }
    }

    /// Whether both endpoints of `other` lie within `tolerance` of the line
    /// carrying this edge.
    ///
    /// Works on the cached geometry of both edges. A zero-length edge carries
    /// no line and is collinear with nothing.
    pub fn collinear_with(&self, other: &Edge<I>, tolerance: f64) -> bool {
        if self.length <= 0.0 {
            return false;
        }
        let half = other.direction * (other.length * 0.5);
        [other.midpoint + half, other.midpoint - half]
            .iter()
            .all(|p| {
                let d = p - self.midpoint;
                (d - self.direction * d.dot(&self.direction)).norm() <= tolerance
            })
    }

    pub(crate) fn replace_vertex(&mut self, old: VertexId<I>, new: VertexId<I>) -> bool {
        match self.vertices.iter_mut().find(|v| **v == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }
}

/// A triangle with ordered vertices.
///
/// The vertex order defines the winding and therefore the normal direction.
#[derive(Debug, Clone)]
pub struct Triangle<I: MeshIndex = u32> {
    pub(crate) vertices: [VertexId<I>; 3],
    /// Edges in the order [v0-v1, v0-v2, v1-v2]; invalid until edges are built.
    pub(crate) edges: [EdgeId<I>; 3],
    pub(crate) tex_coords: [Point2<f64>; 3],
    normal: Vector3<f64>,
    centroid: Point3<f64>,
    perimeter: f64,
    area: f64,
    distance_to_origin: f64,
}

impl<I: MeshIndex> Triangle<I> {
    pub(crate) fn new(vertices: [VertexId<I>; 3], positions: [&Point3<f64>; 3]) -> Self {
        let mut tri = Self {
            vertices,
            edges: [EdgeId::invalid(); 3],
            tex_coords: [Point2::origin(); 3],
            normal: Vector3::zeros(),
            centroid: Point3::origin(),
            perimeter: 0.0,
            area: 0.0,
            distance_to_origin: 0.0,
        };
        tri.calc_properties(positions);
        tri
    }

    /// Refresh the cached normal, centroid, perimeter, area and plane distance.
    pub(crate) fn calc_properties(&mut self, [p0, p1, p2]: [&Point3<f64>; 3]) {
        self.centroid = Point3::from((p0.coords + p1.coords + p2.coords) / 3.0);

        let c0 = p0 - p1;
        let c1 = p0 - p2;
        let c2 = p2 - p1;

        let n = c0.cross(&c1);
        self.normal = n.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        self.distance_to_origin = self.centroid.coords.dot(&self.normal);

        let (a, b, c) = (c0.norm(), c1.norm(), c2.norm());
        self.perimeter = a + b + c;

        // Heron's formula; rounding can push the product slightly negative.
        let s = self.perimeter / 2.0;
        self.area = (s * (s - a) * (s - b) * (s - c)).max(0.0).sqrt();
    }

    /// Flip the winding: swap vertices 1 and 2 and negate the normal.
    pub(crate) fn negate_normal(&mut self) {
        self.vertices.swap(1, 2);
        // Keep the [v0-v1, v0-v2, v1-v2] edge layout.
        self.edges.swap(0, 1);
        self.tex_coords.swap(1, 2);
        self.normal = -self.normal;
        self.distance_to_origin = -self.distance_to_origin;
    }

    /// The three vertices in winding order.
    #[inline]
    pub fn vertices(&self) -> [VertexId<I>; 3] {
        self.vertices
    }

    /// The three edges in the order [v0-v1, v0-v2, v1-v2].
    #[inline]
    pub fn edges(&self) -> [EdgeId<I>; 3] {
        self.edges
    }

    /// Cached unit normal.
    #[inline]
    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    /// Cached centroid.
    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        self.centroid
    }

    /// Cached perimeter.
    #[inline]
    pub fn perimeter(&self) -> f64 {
        self.perimeter
    }

    /// Cached area.
    #[inline]
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Signed distance of the supporting plane from the origin along the normal.
    #[inline]
    pub fn distance_to_origin(&self) -> f64 {
        self.distance_to_origin
    }

    /// Texture coordinate of corner `i`.
    #[inline]
    pub fn tex_coord(&self, i: usize) -> Point2<f64> {
        self.tex_coords[i]
    }

    /// Set the texture coordinate of corner `i`.
    #[inline]
    pub fn set_tex_coord(&mut self, i: usize, st: Point2<f64>) {
        self.tex_coords[i] = st;
    }

    /// Whether `v` is a corner of this triangle.
    #[inline]
    pub fn contains(&self, v: VertexId<I>) -> bool {
        self.vertices.contains(&v)
    }

    /// Local slot (0..3) of `v`, if it is a corner.
    #[inline]
    pub fn corner(&self, v: VertexId<I>) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }

    /// Whether two triangles lie on a common plane within the given tolerances.
    ///
    /// `orientation_tolerance` is an angle in radians between the normals,
    /// `distance_tolerance` bounds the plane offset difference.
    pub fn coplanar_with(
        &self,
        other: &Triangle<I>,
        distance_tolerance: f64,
        orientation_tolerance: f64,
    ) -> bool {
        let cos = self.normal.dot(&other.normal).clamp(-1.0, 1.0);
        if cos.acos() > orientation_tolerance {
            return false;
        }
        let offset = other.centroid.coords.dot(&self.normal);
        (self.distance_to_origin - offset).abs() < distance_tolerance
    }

    pub(crate) fn replace_vertex(&mut self, old: VertexId<I>, new: VertexId<I>) -> bool {
        match self.vertices.iter_mut().find(|v| **v == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }
}

/// A named group of triangles, edges and vertices sharing at most one texture.
///
/// Shapes only partition the mesh for display; the reconstruction algorithms
/// ignore them. Members keep their insertion order; a set beside each list
/// keeps membership tests constant time.
#[derive(Debug, Clone, Default)]
pub struct Shape<I: MeshIndex = u32> {
    triangles: Vec<TriangleId<I>>,
    edges: Vec<EdgeId<I>>,
    vertices: Vec<VertexId<I>>,
    triangle_set: HashSet<TriangleId<I>>,
    edge_set: HashSet<EdgeId<I>>,
    vertex_set: HashSet<VertexId<I>>,
    texture: Option<String>,
}

impl<I: MeshIndex> Shape<I> {
    /// Create an empty shape.
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
            edges: Vec::new(),
            vertices: Vec::new(),
            triangle_set: HashSet::new(),
            edge_set: HashSet::new(),
            vertex_set: HashSet::new(),
            texture: None,
        }
    }

    /// Attach a texture name.
    pub fn with_texture(mut self, name: impl Into<String>) -> Self {
        self.texture = Some(name.into());
        self
    }

    /// Texture name, if any.
    pub fn texture(&self) -> Option<&str> {
        self.texture.as_deref()
    }

    /// Triangles of this shape.
    pub fn triangles(&self) -> &[TriangleId<I>] {
        &self.triangles
    }

    /// Edges of this shape.
    pub fn edges(&self) -> &[EdgeId<I>] {
        &self.edges
    }

    /// Vertices of this shape.
    pub fn vertices(&self) -> &[VertexId<I>] {
        &self.vertices
    }

    /// Whether `v` belongs to this shape.
    pub fn contains_vertex(&self, v: VertexId<I>) -> bool {
        self.vertex_set.contains(&v)
    }

    /// Whether `e` belongs to this shape.
    pub fn contains_edge(&self, e: EdgeId<I>) -> bool {
        self.edge_set.contains(&e)
    }

    /// Whether `t` belongs to this shape.
    pub fn contains_triangle(&self, t: TriangleId<I>) -> bool {
        self.triangle_set.contains(&t)
    }

    /// Whether every vertex of `vs` belongs to this shape.
    pub fn contains_all(&self, vs: &[VertexId<I>]) -> bool {
        vs.iter().all(|v| self.vertex_set.contains(v))
    }

    /// Append `t` unless it is already a member. Returns whether it was added.
    pub(crate) fn push_triangle(&mut self, t: TriangleId<I>) -> bool {
        let added = self.triangle_set.insert(t);
        if added {
            self.triangles.push(t);
        }
        added
    }

    /// Append `e` unless it is already a member. Returns whether it was added.
    pub(crate) fn push_edge(&mut self, e: EdgeId<I>) -> bool {
        let added = self.edge_set.insert(e);
        if added {
            self.edges.push(e);
        }
        added
    }

    /// Append `v` unless it is already a member. Returns whether it was added.
    pub(crate) fn push_vertex(&mut self, v: VertexId<I>) -> bool {
        let added = self.vertex_set.insert(v);
        if added {
            self.vertices.push(v);
        }
        added
    }

    pub(crate) fn replace_vertex(&mut self, old: VertexId<I>, new: VertexId<I>) {
        if !self.vertex_set.remove(&old) {
            return;
        }
        if self.vertex_set.insert(new) {
            if let Some(slot) = self.vertices.iter_mut().find(|v| **v == old) {
                *slot = new;
            }
        } else {
            self.vertices.retain(|&v| v != old);
        }
    }

    pub(crate) fn detach_vertex(&mut self, v: VertexId<I>) {
        if self.vertex_set.remove(&v) {
            self.vertices.retain(|&x| x != v);
        }
    }

    pub(crate) fn detach_edge(&mut self, e: EdgeId<I>) {
        if self.edge_set.remove(&e) {
            self.edges.retain(|&x| x != e);
        }
    }

    pub(crate) fn detach_triangle(&mut self, t: TriangleId<I>) {
        if self.triangle_set.remove(&t) {
            self.triangles.retain(|&x| x != t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(a: usize, b: usize, c: usize) -> [VertexId; 3] {
        [VertexId::new(a), VertexId::new(b), VertexId::new(c)]
    }

    #[test]
    fn test_triangle_properties() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(3.0, 0.0, 0.0);
        let p2 = Point3::new(0.0, 4.0, 0.0);
        let tri: Triangle = Triangle::new(ids(0, 1, 2), [&p0, &p1, &p2]);

        assert!((tri.normal() - Vector3::z()).norm() < 1e-12);
        assert!((tri.perimeter() - 12.0).abs() < 1e-12);
        assert!((tri.area() - 6.0).abs() < 1e-12);
        assert!((tri.centroid() - Point3::new(1.0, 4.0 / 3.0, 0.0)).norm() < 1e-12);
        assert!(tri.distance_to_origin().abs() < 1e-12);
    }

    #[test]
    fn test_negate_normal_swaps_winding() {
        let p0 = Point3::new(0.0, 0.0, 1.0);
        let p1 = Point3::new(1.0, 0.0, 1.0);
        let p2 = Point3::new(0.0, 1.0, 1.0);
        let mut tri: Triangle = Triangle::new(ids(0, 1, 2), [&p0, &p1, &p2]);
        tri.edges = [EdgeId::new(10), EdgeId::new(11), EdgeId::new(12)];
        let d = tri.distance_to_origin();

        tri.negate_normal();

        assert_eq!(tri.vertices(), ids(0, 2, 1));
        assert_eq!(tri.edges(), [EdgeId::new(11), EdgeId::new(10), EdgeId::new(12)]);
        assert!((tri.normal() + Vector3::z()).norm() < 1e-12);
        assert!((tri.distance_to_origin() + d).abs() < 1e-12);
    }

    #[test]
    fn test_edge_properties_and_equality() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        let e: Edge = Edge::new(VertexId::new(0), VertexId::new(1), &a, &b);
        let r: Edge = Edge::new(VertexId::new(1), VertexId::new(0), &b, &a);

        assert!((e.length() - 2.0).abs() < 1e-12);
        assert_eq!(e.midpoint(), Point3::new(1.0, 0.0, 0.0));
        assert!((e.direction() + Vector3::x()).norm() < 1e-12);
        assert!(e.same_endpoints(&r));
        assert_eq!(e.other(VertexId::new(0)), VertexId::new(1));
    }

    #[test]
    fn test_vertex_normal_running_sum() {
        let mut v: Vertex = Vertex::from_coords(0.0, 0.0, 0.0);
        assert!(v.normal().is_none());

        v.add_normal(&Vector3::x());
        v.add_normal(&Vector3::y());
        let expected = Vector3::new(1.0, 1.0, 0.0).normalize();
        assert!((v.normal().unwrap() - expected).norm() < 1e-12);

        // The third normal is added to an already normalized sum.
        v.add_normal(&Vector3::z());
        let expected = (expected + Vector3::z()).normalize();
        assert!((v.normal().unwrap() - expected).norm() < 1e-12);
    }

    #[test]
    fn test_coplanar() {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let t0: Triangle = Triangle::new(ids(0, 1, 2), [&p[0], &p[1], &p[2]]);
        let t1: Triangle = Triangle::new(ids(1, 3, 2), [&p[1], &p[3], &p[2]]);
        let t2: Triangle = Triangle::new(ids(1, 4, 2), [&p[1], &p[4], &p[2]]);

        assert!(t0.coplanar_with(&t1, 1e-6, 0.1));
        assert!(!t0.coplanar_with(&t2, 1e-6, 0.1));
    }

    fn edge(a: [f64; 3], b: [f64; 3]) -> Edge {
        Edge::new(
            VertexId::new(0),
            VertexId::new(1),
            &Point3::from(a),
            &Point3::from(b),
        )
    }

    #[test]
    fn test_collinear_edges() {
        let base = edge([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]);

        // Beyond the segment but on the same line.
        assert!(base.collinear_with(&edge([3.0, 0.0, 0.0], [5.0, 0.0, 0.0]), 1e-9));
        assert!(base.collinear_with(&edge([0.5, 0.01, 0.0], [2.0, -0.01, 0.0]), 0.02));
        // Parallel but offset.
        assert!(!base.collinear_with(&edge([0.0, 0.5, 0.0], [1.0, 0.5, 0.0]), 0.1));
        // One endpoint on the line, the other off it.
        assert!(!base.collinear_with(&edge([0.5, 0.0, 0.0], [0.5, 1.0, 0.0]), 0.1));

        let point = edge([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        assert!(!point.collinear_with(&base, 1.0));
    }

    #[test]
    fn test_shape_membership() {
        let mut shape: Shape = Shape::new();
        assert!(shape.push_vertex(VertexId::new(3)));
        assert!(shape.push_vertex(VertexId::new(1)));
        assert!(!shape.push_vertex(VertexId::new(3)));
        assert!(shape.push_edge(EdgeId::new(0)));
        assert!(!shape.push_edge(EdgeId::new(0)));
        assert!(shape.push_triangle(TriangleId::new(2)));

        assert_eq!(shape.vertices(), &[VertexId::new(3), VertexId::new(1)]);
        assert_eq!(shape.edges().len(), 1);
        assert!(shape.contains_all(&[VertexId::new(1), VertexId::new(3)]));

        // Replacing onto an existing member drops the old entry.
        shape.replace_vertex(VertexId::new(3), VertexId::new(1));
        assert_eq!(shape.vertices(), &[VertexId::new(1)]);
        assert!(!shape.contains_vertex(VertexId::new(3)));

        // Replacing onto a new id keeps the position.
        shape.push_vertex(VertexId::new(5));
        shape.replace_vertex(VertexId::new(1), VertexId::new(9));
        assert_eq!(shape.vertices(), &[VertexId::new(9), VertexId::new(5)]);

        shape.detach_edge(EdgeId::new(0));
        shape.detach_triangle(TriangleId::new(2));
        assert!(!shape.contains_edge(EdgeId::new(0)));
        assert!(!shape.contains_triangle(TriangleId::new(2)));
        assert!(shape.edges().is_empty());
        assert!(shape.triangles().is_empty());
    }
}
