//! Whole-mesh geometric transforms and cached property refresh.

use nalgebra::{Point3, Rotation3, Vector3};

use super::index::{EdgeId, MeshIndex, TriangleId, VertexId};
use super::topology::Mesh;

impl<I: MeshIndex> Mesh<I> {
    /// Arithmetic mean of all vertex positions (origin for an empty mesh).
    pub fn centroid(&self) -> Point3<f64> {
        if self.is_empty() {
            return Point3::origin();
        }
        let sum: Vector3<f64> = self.vertices().map(|(_, v)| v.position.coords).sum();
        Point3::from(sum / self.num_vertices() as f64)
    }

    /// Axis-aligned bounding box as (min, max), or `None` for an empty mesh.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut iter = self.vertices().map(|(_, v)| v.position);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), p| {
            (lo.inf(&p), hi.sup(&p))
        }))
    }

    /// Translate every vertex and refresh cached properties.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for vertex in self.vertices.iter_mut().flatten() {
            vertex.position += offset;
        }
        self.recalculate_properties();
    }

    /// Scale every vertex about the origin and refresh cached properties.
    pub fn scale(&mut self, factor: f64) {
        for vertex in self.vertices.iter_mut().flatten() {
            vertex.position.coords *= factor;
        }
        self.recalculate_properties();
    }

    /// Rotate every vertex about the origin and refresh cached properties.
    pub fn rotate(&mut self, rotation: &Rotation3<f64>) {
        for vertex in self.vertices.iter_mut().flatten() {
            vertex.position = rotation * vertex.position;
        }
        self.recalculate_properties();
    }

    /// Move the centroid to the origin, remembering the translation.
    pub fn move_to_centroid(&mut self) {
        let c = self.centroid().coords;
        self.translate(&-c);
        self.model_centroid += c / self.model_scale;
    }

    /// Center the mesh and scale it so the farthest vertex lies on the unit sphere.
    ///
    /// Both the translation and the scale are kept so that
    /// [`original_position`](Self::original_position) can undo them.
    /// A mesh whose vertices all coincide is only centered.
    pub fn scale_into_unit_sphere(&mut self) {
        self.move_to_centroid();
        let radius = self
            .vertices()
            .map(|(_, v)| v.position.coords.norm())
            .fold(0.0_f64, f64::max);
        if radius > 0.0 {
            let factor = 1.0 / radius;
            self.scale(factor);
            self.model_scale *= factor;
        }
    }

    /// Translation removed by normalization, in original units.
    pub fn model_centroid(&self) -> Vector3<f64> {
        self.model_centroid
    }

    /// Accumulated normalization scale factor.
    pub fn model_scale(&self) -> f64 {
        self.model_scale
    }

    /// Map a normalized-space point back into the original coordinate frame.
    pub fn to_original(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(p.coords / self.model_scale + self.model_centroid)
    }

    /// Position of `v` in the original coordinate frame.
    pub fn original_position(&self, v: VertexId<I>) -> Point3<f64> {
        self.to_original(self.position(v))
    }

    /// Refresh the cached length, midpoint and direction of one edge.
    pub fn recalculate_edge(&mut self, e: EdgeId<I>) {
        let [a, b] = self.edge(e).vertices();
        let (pa, pb) = (*self.position(a), *self.position(b));
        self.edge_mut(e).calc_properties(&pa, &pb);
    }

    /// Refresh the cached normal, centroid, perimeter and area of one triangle.
    pub fn recalculate_triangle(&mut self, t: TriangleId<I>) {
        let [p0, p1, p2] = self.triangle_positions(t);
        self.triangle_mut(t).calc_properties([&p0, &p1, &p2]);
    }

    /// Refresh every cached edge and triangle property and rebuild vertex normals.
    pub fn recalculate_properties(&mut self) {
        let edge_ids: Vec<EdgeId<I>> = self.edge_ids().collect();
        for e in edge_ids {
            self.recalculate_edge(e);
        }
        let triangle_ids: Vec<TriangleId<I>> = self.triangle_ids().collect();
        for t in triangle_ids {
            self.recalculate_triangle(t);
        }
        let vertex_ids: Vec<VertexId<I>> = self.vertex_ids().collect();
        for v in vertex_ids {
            self.rebuild_vertex_normal(v);
        }
    }

    /// Flip the winding of every triangle.
    pub fn negate_surface_normals(&mut self) {
        for tri in self.triangles.iter_mut().flatten() {
            tri.negate_normal();
        }
        for vertex in self.vertices.iter_mut().flatten() {
            if let Some(n) = vertex.normal.as_mut() {
                *n = -*n;
            }
        }
    }

    /// The vertex closest to `point`, ties going to the lowest id.
    pub fn closest_vertex(&self, point: &Point3<f64>) -> Option<VertexId<I>> {
        let mut best: Option<(VertexId<I>, f64)> = None;
        for (v, vertex) in self.vertices() {
            let d = (vertex.position - point).norm_squared();
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((v, d));
            }
        }
        best.map(|(v, _)| v)
    }

    /// Mean triangle perimeter (0 for a mesh without triangles).
    pub fn average_triangle_perimeter(&self) -> f64 {
        if self.num_triangles() == 0 {
            return 0.0;
        }
        let total: f64 = self.triangles().map(|(_, t)| t.perimeter()).sum();
        total / self.num_triangles() as f64
    }

    /// Total surface area.
    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|(_, t)| t.area()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{cube, tetrahedron};
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_centroid_and_bbox() {
        let mesh: crate::mesh::Mesh = cube();
        let c = mesh.centroid();
        assert!((c - Point3::new(0.5, 0.5, 0.5)).norm() < 1e-12);

        let (lo, hi) = mesh.bounding_box().unwrap();
        assert_eq!(lo, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(hi, Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_unit_sphere_roundtrip() {
        let mut mesh: crate::mesh::Mesh = cube();
        mesh.scale(4.0);
        mesh.translate(&Vector3::new(10.0, -3.0, 2.0));
        let before: Vec<Point3<f64>> = mesh.vertices().map(|(_, v)| v.position).collect();

        mesh.scale_into_unit_sphere();

        assert!(mesh.centroid().coords.norm() < 1e-12);
        let radius = mesh
            .vertices()
            .map(|(_, v)| v.position.coords.norm())
            .fold(0.0, f64::max);
        assert!((radius - 1.0).abs() < 1e-12);

        for (v, p) in mesh.vertex_ids().zip(before) {
            assert!((mesh.original_position(v) - p).norm() < 1e-10);
        }
    }

    #[test]
    fn test_repeated_normalization_keeps_inverse() {
        let mut mesh: crate::mesh::Mesh = tetrahedron();
        mesh.translate(&Vector3::new(5.0, 5.0, 5.0));
        let before: Vec<Point3<f64>> = mesh.vertices().map(|(_, v)| v.position).collect();

        mesh.scale_into_unit_sphere();
        mesh.translate(&Vector3::new(0.0, 0.0, 0.0));
        mesh.scale_into_unit_sphere();

        for (v, p) in mesh.vertex_ids().zip(before) {
            assert!((mesh.original_position(v) - p).norm() < 1e-10);
        }
    }

    #[test]
    fn test_scale_refreshes_cache() {
        let mut mesh: crate::mesh::Mesh = cube();
        let p = mesh.average_triangle_perimeter();
        mesh.scale(2.0);
        assert!((mesh.average_triangle_perimeter() - 2.0 * p).abs() < 1e-12);
        assert!((mesh.surface_area() - 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotate() {
        let mut mesh: crate::mesh::Mesh = tetrahedron();
        let t = TriangleId::new(0);
        let n = mesh.triangle(t).normal();
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        mesh.rotate(&rot);
        assert!((mesh.triangle(t).normal() - rot * n).norm() < 1e-12);
    }

    #[test]
    fn test_negate_surface_normals() {
        let mut mesh: crate::mesh::Mesh = cube();
        let normals: Vec<Vector3<f64>> = mesh.triangles().map(|(_, t)| t.normal()).collect();
        mesh.negate_surface_normals();
        for ((_, t), n) in mesh.triangles().zip(normals) {
            assert!((t.normal() + n).norm() < 1e-12);
        }
    }

    #[test]
    fn test_closest_vertex() {
        let mesh: crate::mesh::Mesh = cube();
        let v = mesh.closest_vertex(&Point3::new(0.9, 0.1, 1.2)).unwrap();
        assert_eq!(*mesh.position(v), Point3::new(1.0, 0.0, 1.0));
        assert!(crate::mesh::Mesh::<u32>::new()
            .closest_vertex(&Point3::origin())
            .is_none());
    }
}
