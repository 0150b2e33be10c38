//! Reconstruction quality metrics.
//!
//! All metrics compare each vertex's original `position` with its
//! `reconstructed` position:
//!
//! - **Mq**: `sqrt(Σ |reconstructed − original|²)`, the geometric error.
//! - **Sq**: `sqrt(Σ |δw(original) − δw(reconstructed)|²)`, the error in a
//!   smoothness signal where `δw` is the Laplacian with inverse-distance
//!   weights `1 / |v − n|`.
//! - **Evis**: `α·Mq + (1 − α)·Sq`, the visual error.
//! - **Hausdorff** (approximate): point-to-neighborhood distances between the
//!   two vertex sets, using each vertex's one-ring instead of a spatial search.
//!
//! # Example
//!
//! ```
//! use lapmesh::algo::metrics::{evaluate, MetricsOptions};
//! use lapmesh::mesh::{build_from_triangles, Mesh};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let mut mesh: Mesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//! mesh.create_edges_from_triangles().unwrap();
//! mesh.compute_all_neighbors();
//! for v in mesh.vertex_ids().collect::<Vec<_>>() {
//!     let p = *mesh.position(v);
//!     mesh.vertex_mut(v).reconstructed = p;
//! }
//!
//! let report = evaluate(&mesh, &MetricsOptions::default()).unwrap();
//! assert_eq!(report.mq, 0.0);
//! ```

use std::marker::PhantomData;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, MeshIndex, VertexId};

/// Options for [`evaluate`].
#[derive(Debug, Clone)]
pub struct MetricsOptions {
    /// Weight of Mq in Evis, in `[0, 1]` (default: 0.5).
    pub alpha: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            parallel: true,
        }
    }
}

impl MetricsOptions {
    /// Set the Evis weight.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Quality of a reconstruction.
#[derive(Debug, Clone)]
pub struct QualityReport<I: MeshIndex = u32> {
    /// Geometric error.
    pub mq: f64,
    /// Smoothness error.
    pub sq: f64,
    /// Weight used for Evis.
    pub alpha: f64,
    /// Visual error `alpha·mq + (1 − alpha)·sq`.
    pub evis: f64,
    /// Reconstructed-to-original distance.
    pub hausdorff_forward: f64,
    /// Original-to-reconstructed distance.
    pub hausdorff_backward: f64,
    /// Larger of the two directions.
    pub hausdorff: f64,
    /// Squared positional error per vertex slot.
    vertex_mq: Vec<f64>,
    /// Squared weighted-Laplacian error per vertex slot.
    vertex_sq: Vec<f64>,
    _marker: PhantomData<I>,
}

impl<I: MeshIndex> QualityReport<I> {
    /// Squared positional error of `v`, its contribution to Mq².
    #[inline]
    pub fn vertex_mq(&self, v: VertexId<I>) -> f64 {
        self.vertex_mq[v.index()]
    }

    /// Squared weighted-Laplacian error of `v`, its contribution to Sq².
    #[inline]
    pub fn vertex_sq(&self, v: VertexId<I>) -> f64 {
        self.vertex_sq[v.index()]
    }
}

/// `p` minus the inverse-distance-weighted mean of `neighbors`.
///
/// Neighbors at zero distance are skipped. Zero when no neighbor remains.
fn weighted_laplacian<'a>(
    p: &Point3<f64>,
    neighbors: impl Iterator<Item = &'a Point3<f64>>,
) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    let mut total = 0.0;
    for n in neighbors {
        let d = (n - p).norm();
        if d <= 0.0 {
            continue;
        }
        let w = 1.0 / d;
        sum += n.coords * w;
        total += w;
    }
    if total == 0.0 {
        return Vector3::zeros();
    }
    p.coords - sum / total
}

/// Inverse-distance Laplacian of `v` on original positions.
pub fn geometric_laplacian<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> Vector3<f64> {
    weighted_laplacian(
        mesh.position(v),
        mesh.neighbors(v).iter().map(|&n| mesh.position(n)),
    )
}

/// Inverse-distance Laplacian of `v` on reconstructed positions.
pub fn reconstructed_laplacian<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> Vector3<f64> {
    weighted_laplacian(
        &mesh.vertex(v).reconstructed,
        mesh.neighbors(v).iter().map(|&n| &mesh.vertex(n).reconstructed),
    )
}

fn vertex_sq<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> f64 {
    (geometric_laplacian(mesh, v) - reconstructed_laplacian(mesh, v)).norm_squared()
}

/// Closest distance from `p` to the `field` positions of `v` and its neighbors.
fn neighborhood_distance<I: MeshIndex>(
    mesh: &Mesh<I>,
    v: VertexId<I>,
    p: &Point3<f64>,
    field: impl Fn(VertexId<I>) -> Point3<f64>,
) -> f64 {
    std::iter::once(v)
        .chain(mesh.neighbors(v).iter().copied())
        .map(|u| (field(u) - p).norm())
        .fold(f64::INFINITY, f64::min)
}

fn forward_distance<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> f64 {
    let r = mesh.vertex(v).reconstructed;
    neighborhood_distance(mesh, v, &r, |u| *mesh.position(u))
}

fn backward_distance<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> f64 {
    neighborhood_distance(mesh, v, mesh.position(v), |u| mesh.vertex(u).reconstructed)
}

/// Geometric error Mq.
pub fn mq<I: MeshIndex>(mesh: &Mesh<I>) -> f64 {
    mesh.vertices()
        .map(|(_, v)| (v.reconstructed - v.position).norm_squared())
        .sum::<f64>()
        .sqrt()
}

/// Smoothness error Sq. Requires current neighbors.
pub fn sq<I: MeshIndex>(mesh: &Mesh<I>) -> Result<f64> {
    mesh.require_neighbors()?;
    Ok(mesh
        .vertex_ids()
        .map(|v| vertex_sq(mesh, v))
        .sum::<f64>()
        .sqrt())
}

/// Visual error `alpha·mq + (1 − alpha)·sq`.
pub fn evis(mq: f64, sq: f64, alpha: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(MeshError::invalid_param(
            "alpha",
            alpha,
            "must be between 0 and 1",
        ));
    }
    Ok(alpha * mq + (1.0 - alpha) * sq)
}

/// Largest distance from a reconstructed vertex to the original positions of
/// itself and its neighbors. Requires current neighbors.
pub fn hausdorff_forward<I: MeshIndex>(mesh: &Mesh<I>) -> Result<f64> {
    mesh.require_neighbors()?;
    Ok(mesh
        .vertex_ids()
        .map(|v| forward_distance(mesh, v))
        .fold(0.0, f64::max))
}

/// Largest distance from an original vertex to the reconstructed positions of
/// itself and its neighbors. Requires current neighbors.
pub fn hausdorff_backward<I: MeshIndex>(mesh: &Mesh<I>) -> Result<f64> {
    mesh.require_neighbors()?;
    Ok(mesh
        .vertex_ids()
        .map(|v| backward_distance(mesh, v))
        .fold(0.0, f64::max))
}

/// Symmetric approximate Hausdorff distance.
pub fn hausdorff<I: MeshIndex>(mesh: &Mesh<I>) -> Result<f64> {
    Ok(hausdorff_forward(mesh)?.max(hausdorff_backward(mesh)?))
}

/// Compute every metric in one pass over the vertices.
pub fn evaluate<I: MeshIndex>(mesh: &Mesh<I>, options: &MetricsOptions) -> Result<QualityReport<I>> {
    mesh.require_neighbors()?;
    // Validate alpha before the per-vertex pass.
    evis(0.0, 0.0, options.alpha)?;

    let ids: Vec<VertexId<I>> = mesh.vertex_ids().collect();
    let per_vertex = |v: VertexId<I>| -> [f64; 4] {
        let vertex = mesh.vertex(v);
        [
            (vertex.reconstructed - vertex.position).norm_squared(),
            vertex_sq(mesh, v),
            forward_distance(mesh, v),
            backward_distance(mesh, v),
        ]
    };
    let values: Vec<[f64; 4]> = if options.parallel {
        ids.par_iter().map(|&v| per_vertex(v)).collect()
    } else {
        ids.iter().map(|&v| per_vertex(v)).collect()
    };

    let mut vertex_mq = vec![0.0; mesh.vertex_slots()];
    let mut vertex_sq = vec![0.0; mesh.vertex_slots()];
    let (mut mq2, mut sq2, mut forward, mut backward) = (0.0, 0.0, 0.0f64, 0.0f64);
    for (&v, [m, s, f, b]) in ids.iter().zip(values) {
        vertex_mq[v.index()] = m;
        vertex_sq[v.index()] = s;
        mq2 += m;
        sq2 += s;
        forward = forward.max(f);
        backward = backward.max(b);
    }

    let (mq, sq) = (mq2.sqrt(), sq2.sqrt());
    Ok(QualityReport {
        mq,
        sq,
        alpha: options.alpha,
        evis: evis(mq, sq, options.alpha)?,
        hausdorff_forward: forward,
        hausdorff_backward: backward,
        hausdorff: forward.max(backward),
        vertex_mq,
        vertex_sq,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{connected_cube, grid};

    fn copy_positions(mesh: &mut Mesh) {
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            let p = *mesh.position(v);
            mesh.vertex_mut(v).reconstructed = p;
        }
    }

    #[test]
    fn test_exact_reconstruction_is_zero() {
        let mut mesh = grid(5);
        copy_positions(&mut mesh);
        let report = evaluate(&mesh, &MetricsOptions::default()).unwrap();
        assert_eq!(report.mq, 0.0);
        assert!(report.sq < 1e-12);
        assert_eq!(report.hausdorff, 0.0);
    }

    #[test]
    fn test_translation_has_no_smoothness_error() {
        let mut mesh = connected_cube();
        let offset = Vector3::new(0.0, 0.0, 0.2);
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            let p = *mesh.position(v) + offset;
            mesh.vertex_mut(v).reconstructed = p;
        }

        let report = evaluate(&mesh, &MetricsOptions::default()).unwrap();
        assert!((report.mq - (8.0f64 * 0.04).sqrt()).abs() < 1e-12);
        assert!(report.sq < 1e-12);
        assert!((report.evis - 0.5 * report.mq).abs() < 1e-12);
        assert!((report.hausdorff_forward - 0.2).abs() < 1e-12);
        assert!((report.hausdorff_backward - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_single_vertex_displacement() {
        let mut mesh = connected_cube();
        copy_positions(&mut mesh);
        let v = VertexId::new(6);
        mesh.vertex_mut(v).reconstructed = Point3::new(1.0, 1.0, 1.5);

        let report = evaluate(&mesh, &MetricsOptions::default().sequential()).unwrap();
        assert!((report.mq - 0.5).abs() < 1e-12);
        assert!((report.vertex_mq(v) - 0.25).abs() < 1e-12);
        assert_eq!(report.vertex_mq(VertexId::new(0)), 0.0);
        assert!(report.vertex_sq(v) > 0.0);
        // Vertex 0 is not adjacent to vertex 6.
        assert_eq!(report.vertex_sq(VertexId::new(0)), 0.0);
        assert!((report.hausdorff_forward - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut mesh = grid(7);
        for v in mesh.vertex_ids().collect::<Vec<_>>() {
            let p = *mesh.position(v);
            let bump = 0.01 * (v.index() % 3) as f64;
            mesh.vertex_mut(v).reconstructed = p + Vector3::new(bump, 0.0, -bump);
        }
        let a = evaluate(&mesh, &MetricsOptions::default()).unwrap();
        let b = evaluate(&mesh, &MetricsOptions::default().sequential()).unwrap();
        assert!((a.mq - b.mq).abs() < 1e-12);
        assert!((a.sq - b.sq).abs() < 1e-12);
        assert_eq!(a.hausdorff, b.hausdorff);
        assert!((sq(&mesh).unwrap() - b.sq).abs() < 1e-12);
        assert!((mq(&mesh) - b.mq).abs() < 1e-12);
        assert_eq!(hausdorff(&mesh).unwrap(), b.hausdorff);
    }

    #[test]
    fn test_evis_alpha_range() {
        assert_eq!(evis(2.0, 4.0, 1.0).unwrap(), 2.0);
        assert_eq!(evis(2.0, 4.0, 0.0).unwrap(), 4.0);
        assert!(evis(2.0, 4.0, 1.5).is_err());
        assert!(evis(2.0, 4.0, -0.1).is_err());

        let mesh = connected_cube();
        let options = MetricsOptions::default().with_alpha(2.0);
        assert!(matches!(
            evaluate(&mesh, &options),
            Err(MeshError::InvalidParameter { name: "alpha", .. })
        ));
    }

    #[test]
    fn test_weighted_laplacian_skips_coincident() {
        let p = Point3::new(0.0, 0.0, 0.0);
        let ns = [p, Point3::new(1.0, 0.0, 0.0), Point3::new(-2.0, 0.0, 0.0)];
        // Weights 1 and 1/2: mean x = (1 - 1) / 1.5 = 0.
        assert!(weighted_laplacian(&p, ns.iter()).norm() < 1e-12);
        assert_eq!(weighted_laplacian(&p, [p].iter()), Vector3::zeros());
    }
}
