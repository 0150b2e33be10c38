//! Reconstruction of vertex positions from Laplacian coordinates.
//!
//! The least-squares system has one row per vertex and one row per anchor:
//!
//! ```text
//! deg(i) x_i - Σ_{j ∈ N(i)} x_j = deg(i) δ_i     (Laplacian rows)
//!                           w x_a = w p_a        (anchor rows)
//! ```
//!
//! Columns are the live vertices in id order. Small systems are solved with
//! dense QR of the stacked matrix, larger ones with a sparse Cholesky
//! factorization of the normal equations shared by all three axes.
//! Conjugate gradient is available on request. The solution is written to each vertex's
//! `reconstructed` position; original positions are never touched.
//!
//! # Example
//!
//! ```
//! use lapmesh::algo::laplacian::{compute_laplacian_coordinates, quantize_laplacian};
//! use lapmesh::algo::reconstruct::{reconstruct, ReconstructOptions};
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
//! mesh.compute_all_neighbors();
//! compute_laplacian_coordinates(&mut mesh).unwrap();
//! quantize_laplacian(&mut mesh, 12).unwrap();
//!
//! reconstruct(&mut mesh, &[VertexId::new(0)], &ReconstructOptions::default()).unwrap();
//! ```

use std::collections::VecDeque;

use log::{debug, warn};
use nalgebra::{DVector, Point3, Vector3};

use super::laplacian::{umbrella, Quantizer};
use super::sparse::{
    dense_least_squares, preconditioned_conjugate_gradient, sparse_cholesky_least_squares,
    CsrMatrix,
};
use crate::error::{MeshError, Result, SolveError};
use crate::mesh::{Mesh, MeshIndex, VertexId};

/// Linear solver used for a least-squares system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Dense QR up to `dense_limit` unknowns, sparse Cholesky above.
    #[default]
    Auto,
    /// Sparse Cholesky factorization of the normal equations.
    SparseCholesky,
    /// Dense QR factorization of the full system.
    DenseQr,
    /// Jacobi-preconditioned conjugate gradient on the normal equations.
    ///
    /// The only solver that uses a warm start, and the only one that can
    /// fail with [`SolveError::NotConverged`].
    ConjugateGradient,
}

/// Which per-vertex differential coordinate drives the Laplacian rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeltaSource {
    /// Exact Laplacian coordinates.
    Raw,
    /// Quantized Laplacian coordinates.
    #[default]
    Quantized,
}

/// Options for reconstruction.
#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    /// Weight of each anchor row (default: 1.0).
    pub anchor_weight: f64,

    /// Maximum conjugate gradient iterations per axis (default: 10000).
    pub max_iterations: usize,

    /// Relative residual at which conjugate gradient stops (default: 1e-10).
    pub tolerance: f64,

    /// Solver selection (default: Auto).
    pub solver: SolverKind,

    /// Largest unknown count solved densely under `SolverKind::Auto` (default: 400).
    pub dense_limit: usize,

    /// Differential coordinates to reconstruct from (default: Quantized).
    pub source: DeltaSource,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            anchor_weight: 1.0,
            max_iterations: 10_000,
            tolerance: 1e-10,
            solver: SolverKind::Auto,
            dense_limit: 400,
            source: DeltaSource::Quantized,
        }
    }
}

impl ReconstructOptions {
    /// Set the anchor row weight.
    pub fn with_anchor_weight(mut self, weight: f64) -> Self {
        self.anchor_weight = weight;
        self
    }

    /// Set the conjugate gradient iteration cap.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the conjugate gradient tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the solver.
    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Set the dense/sparse switch-over size.
    pub fn with_dense_limit(mut self, limit: usize) -> Self {
        self.dense_limit = limit;
        self
    }

    /// Set which differential coordinates to use.
    pub fn with_source(mut self, source: DeltaSource) -> Self {
        self.source = source;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.anchor_weight > 0.0 && self.anchor_weight.is_finite()) {
            return Err(MeshError::invalid_param(
                "anchor_weight",
                self.anchor_weight,
                "must be positive and finite",
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(MeshError::invalid_param(
                "tolerance",
                self.tolerance,
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Per-axis solution of a reconstruction, indexed by system column.
#[derive(Debug, Clone)]
pub struct Solution {
    axes: [DVector<f64>; 3],
}

impl Solution {
    /// Solved position of column `col`.
    pub fn point(&self, col: usize) -> Point3<f64> {
        Point3::new(self.axes[0][col], self.axes[1][col], self.axes[2][col])
    }

    /// Number of solved columns.
    pub fn len(&self) -> usize {
        self.axes[0].len()
    }

    /// Whether the solution has no columns.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A graph-level least-squares problem in dense column space.
struct GraphProblem<'a> {
    adjacency: &'a [Vec<usize>],
    deltas: &'a [Vector3<f64>],
    anchors: &'a [(usize, Point3<f64>)],
}

impl GraphProblem<'_> {
    /// Check the system has a unique solution.
    ///
    /// Errors report the offending column.
    fn check(&self) -> std::result::Result<(), (SolveError, usize)> {
        if self.anchors.is_empty() {
            return Err((SolveError::NoAnchors, 0));
        }
        let n = self.adjacency.len();
        let mut anchored = vec![false; n];
        for &(c, _) in self.anchors {
            anchored[c] = true;
        }

        for c in 0..n {
            if self.adjacency[c].is_empty() && !anchored[c] {
                return Err((SolveError::IsolatedVertex { vertex: c }, c));
            }
        }

        let mut seen = vec![false; n];
        let mut queue = VecDeque::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            queue.push_back(start);
            let mut has_anchor = false;
            while let Some(c) = queue.pop_front() {
                has_anchor |= anchored[c];
                for &nb in &self.adjacency[c] {
                    if !seen[nb] {
                        seen[nb] = true;
                        queue.push_back(nb);
                    }
                }
            }
            if !has_anchor {
                return Err((SolveError::UnanchoredComponent { vertex: start }, start));
            }
        }
        Ok(())
    }

    fn assemble(&self, weight: f64) -> (CsrMatrix, [DVector<f64>; 3]) {
        let n = self.adjacency.len();
        let rows = n + self.anchors.len();
        let nnz: usize = self.adjacency.iter().map(|a| a.len() + 1).sum::<usize>() + self.anchors.len();

        let mut triplets = Vec::with_capacity(nnz);
        let mut rhs = [DVector::zeros(rows), DVector::zeros(rows), DVector::zeros(rows)];

        for (i, neighbors) in self.adjacency.iter().enumerate() {
            let degree = neighbors.len() as f64;
            triplets.push((i, i, degree));
            for &j in neighbors {
                triplets.push((i, j, -1.0));
            }
            let b = self.deltas[i] * degree;
            for axis in 0..3 {
                rhs[axis][i] = b[axis];
            }
        }
        for (k, &(c, p)) in self.anchors.iter().enumerate() {
            let row = n + k;
            triplets.push((row, c, weight));
            for axis in 0..3 {
                rhs[axis][row] = weight * p[axis];
            }
        }

        (CsrMatrix::from_triplets(rows, n, triplets), rhs)
    }
}

fn solve_system(
    matrix: &CsrMatrix,
    rhs: &[DVector<f64>; 3],
    options: &ReconstructOptions,
    warm: Option<&Solution>,
) -> std::result::Result<Solution, SolveError> {
    let n = matrix.ncols();
    let solver = match options.solver {
        SolverKind::Auto if n <= options.dense_limit => SolverKind::DenseQr,
        SolverKind::Auto => SolverKind::SparseCholesky,
        kind => kind,
    };

    let axes: Vec<DVector<f64>> = match solver {
        SolverKind::DenseQr => dense_least_squares(matrix, rhs)?,
        SolverKind::SparseCholesky | SolverKind::Auto => {
            sparse_cholesky_least_squares(matrix, rhs)?
        }
        SolverKind::ConjugateGradient => {
            let normal = matrix.normal_matrix();
            let mut axes = Vec::with_capacity(3);
            for (axis, b) in rhs.iter().enumerate() {
                let atb = matrix.transpose_mul_vec(b);
                let x0 = warm.filter(|w| w.len() == n).map(|w| &w.axes[axis]);
                let sol = preconditioned_conjugate_gradient(
                    &normal,
                    &atb,
                    x0,
                    options.max_iterations,
                    options.tolerance,
                )?;
                debug!("axis {} converged in {} iterations", axis, sol.iterations);
                axes.push(sol.x);
            }
            axes
        }
    };

    if axes.iter().any(|a| a.iter().any(|x| !x.is_finite())) {
        return Err(SolveError::NonFinite);
    }
    let mut it = axes.into_iter();
    match (it.next(), it.next(), it.next()) {
        (Some(x), Some(y), Some(z)) => Ok(Solution { axes: [x, y, z] }),
        _ => Err(SolveError::Singular),
    }
}

/// The assembled global reconstruction system of a mesh.
#[derive(Debug, Clone)]
pub struct LaplacianSystem<I: MeshIndex = u32> {
    matrix: CsrMatrix,
    rhs: [DVector<f64>; 3],
    columns: Vec<VertexId<I>>,
    anchors: Vec<VertexId<I>>,
}

impl<I: MeshIndex> LaplacianSystem<I> {
    /// Build the system for `mesh` with the given anchors.
    ///
    /// Anchor rows pin each anchor to its current position. Fails with a
    /// [`SolveError`] when the system would be singular: no anchors, an
    /// isolated vertex that is not anchored, or a connected component
    /// without an anchor.
    pub fn assemble(
        mesh: &Mesh<I>,
        anchors: &[VertexId<I>],
        options: &ReconstructOptions,
    ) -> Result<Self> {
        options.validate()?;
        mesh.require_neighbors()?;
        if mesh.is_empty() {
            return Err(MeshError::EmptyMesh);
        }

        let (column, columns) = mesh.dense_columns();
        let adjacency: Vec<Vec<usize>> = columns
            .iter()
            .map(|&v| mesh.neighbors(v).iter().map(|n| column[n.index()]).collect())
            .collect();
        let deltas: Vec<Vector3<f64>> = columns
            .iter()
            .map(|&v| {
                let vertex = mesh.vertex(v);
                match options.source {
                    DeltaSource::Raw => vertex.laplacian,
                    DeltaSource::Quantized => vertex.quantized_laplacian,
                }
            })
            .collect();

        let mut anchor_rows = Vec::with_capacity(anchors.len());
        for &a in anchors {
            let vertex = mesh.try_vertex(a).ok_or(MeshError::MissingElement {
                kind: "vertex",
                index: a.index(),
            })?;
            anchor_rows.push((column[a.index()], vertex.position));
        }

        let problem = GraphProblem {
            adjacency: &adjacency,
            deltas: &deltas,
            anchors: &anchor_rows,
        };
        problem
            .check()
            .map_err(|(err, col)| remap_vertex(err, columns[col].index()))?;
        let (matrix, rhs) = problem.assemble(options.anchor_weight);

        Ok(Self {
            matrix,
            rhs,
            columns,
            anchors: anchors.to_vec(),
        })
    }

    /// The stacked system matrix.
    pub fn matrix(&self) -> &CsrMatrix {
        &self.matrix
    }

    /// Right-hand side of one axis.
    pub fn rhs(&self, axis: usize) -> &DVector<f64> {
        &self.rhs[axis]
    }

    /// Vertex of each column.
    pub fn columns(&self) -> &[VertexId<I>] {
        &self.columns
    }

    /// The anchors this system was built with.
    pub fn anchors(&self) -> &[VertexId<I>] {
        &self.anchors
    }

    /// Solve the system, optionally warm-starting from an earlier solution.
    pub fn solve(&self, options: &ReconstructOptions, warm: Option<&Solution>) -> Result<Solution> {
        Ok(solve_system(&self.matrix, &self.rhs, options, warm)?)
    }

    /// Write a solution into the vertices' reconstructed positions.
    pub fn apply(&self, mesh: &mut Mesh<I>, solution: &Solution) {
        for (col, &v) in self.columns.iter().enumerate() {
            mesh.vertex_mut(v).reconstructed = solution.point(col);
        }
    }
}

/// Replace the column in a precondition error with the vertex id.
fn remap_vertex(err: SolveError, vertex: usize) -> SolveError {
    match err {
        SolveError::IsolatedVertex { .. } => SolveError::IsolatedVertex { vertex },
        SolveError::UnanchoredComponent { .. } => SolveError::UnanchoredComponent { vertex },
        other => other,
    }
}

/// Reconstruct all vertex positions from Laplacian coordinates and anchors.
///
/// Requires current neighbors and Laplacian (or quantized) coordinates.
pub fn reconstruct<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    anchors: &[VertexId<I>],
    options: &ReconstructOptions,
) -> Result<Solution> {
    reconstruct_warm(mesh, anchors, options, None)
}

/// [`reconstruct`] with a warm start for the iterative solver.
pub fn reconstruct_warm<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    anchors: &[VertexId<I>],
    options: &ReconstructOptions,
    warm: Option<&Solution>,
) -> Result<Solution> {
    let system = LaplacianSystem::assemble(mesh, anchors, options)?;
    let solution = system.solve(options, warm)?;
    system.apply(mesh, &solution);
    Ok(solution)
}

/// Summary of one block of a block-wise solve.
#[derive(Debug, Clone)]
pub struct BlockSummary<I: MeshIndex = u32> {
    /// Number of vertices in the block.
    pub size: usize,
    /// Anchors that fell inside the block.
    pub anchors: usize,
    /// Set when the block had no anchor and its seed was pinned instead.
    pub seed_anchor: Option<VertexId<I>>,
    /// Quantizer fitted to the block's local Laplacian coordinates.
    pub quantizer: Quantizer,
}

/// Reconstruct each segment independently.
///
/// Inside a block, adjacency is restricted to the block's own vertices and
/// Laplacian coordinates are recomputed on that local graph, then quantized
/// with `bits` using a quantizer fitted to the block. Anchors inside the
/// block pin their positions; a block without anchors pins its first vertex.
///
/// Every live vertex must belong to exactly one segment.
pub fn block_least_squares<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    segments: &[Vec<VertexId<I>>],
    anchors: &[VertexId<I>],
    bits: u32,
    options: &ReconstructOptions,
) -> Result<Vec<BlockSummary<I>>> {
    options.validate()?;
    mesh.require_neighbors()?;

    const NONE: usize = usize::MAX;
    let mut block_of = vec![NONE; mesh.vertex_slots()];
    let mut local = vec![NONE; mesh.vertex_slots()];
    for (b, segment) in segments.iter().enumerate() {
        for (i, &v) in segment.iter().enumerate() {
            if mesh.try_vertex(v).is_none() {
                return Err(MeshError::MissingElement {
                    kind: "vertex",
                    index: v.index(),
                });
            }
            if block_of[v.index()] != NONE {
                return Err(MeshError::InvalidState(format!(
                    "vertex {} appears in more than one segment",
                    v.index()
                )));
            }
            block_of[v.index()] = b;
            local[v.index()] = i;
        }
    }
    if let Some(v) = mesh.vertex_ids().find(|v| block_of[v.index()] == NONE) {
        return Err(SolveError::UnanchoredComponent { vertex: v.index() }.into());
    }

    let mut is_anchor = vec![false; mesh.vertex_slots()];
    for &a in anchors {
        if mesh.try_vertex(a).is_none() {
            return Err(MeshError::MissingElement {
                kind: "vertex",
                index: a.index(),
            });
        }
        is_anchor[a.index()] = true;
    }

    let mut summaries = Vec::with_capacity(segments.len());
    for (b, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }

        let adjacency: Vec<Vec<usize>> = segment
            .iter()
            .map(|&v| {
                mesh.neighbors(v)
                    .iter()
                    .filter(|n| block_of[n.index()] == b)
                    .map(|n| local[n.index()])
                    .collect()
            })
            .collect();

        let raw: Vec<Vector3<f64>> = segment
            .iter()
            .zip(&adjacency)
            .map(|(&v, nbrs)| {
                umbrella(
                    mesh.position(v),
                    nbrs.iter().map(|&j| mesh.position(segment[j])),
                )
            })
            .collect();
        let quantizer = Quantizer::fit(raw.iter().copied(), bits)?;
        let deltas: Vec<Vector3<f64>> = match options.source {
            DeltaSource::Raw => raw,
            DeltaSource::Quantized => raw.iter().map(|d| quantizer.quantize(d)).collect(),
        };

        let mut anchor_rows: Vec<(usize, Point3<f64>)> = segment
            .iter()
            .enumerate()
            .filter(|(_, v)| is_anchor[v.index()])
            .map(|(i, &v)| (i, *mesh.position(v)))
            .collect();
        let in_block = anchor_rows.len();
        let mut seed_anchor = None;
        if anchor_rows.is_empty() {
            let seed = segment[0];
            warn!(
                "block {} ({} vertices) has no anchor; pinning {:?}",
                b,
                segment.len(),
                seed
            );
            anchor_rows.push((0, *mesh.position(seed)));
            seed_anchor = Some(seed);
        }

        let problem = GraphProblem {
            adjacency: &adjacency,
            deltas: &deltas,
            anchors: &anchor_rows,
        };
        problem
            .check()
            .map_err(|(err, col)| remap_vertex(err, segment[col].index()))?;
        let (matrix, rhs) = problem.assemble(options.anchor_weight);
        let solution = solve_system(&matrix, &rhs, options, None)?;

        for (i, &v) in segment.iter().enumerate() {
            mesh.vertex_mut(v).reconstructed = solution.point(i);
        }
        debug!("solved block {}: {} vertices, {} anchors", b, segment.len(), in_block);

        summaries.push(BlockSummary {
            size: segment.len(),
            anchors: in_block,
            seed_anchor,
            quantizer,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::laplacian::{compute_laplacian_coordinates, quantize_laplacian};
    use crate::test_util::{connected_cube, grid, two_components};

    fn max_error(mesh: &Mesh) -> f64 {
        mesh.vertices()
            .map(|(_, v)| (v.reconstructed - v.position).norm())
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_all_anchored_raw_roundtrip() {
        let mut mesh = grid(6);
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let anchors: Vec<VertexId> = mesh.vertex_ids().collect();

        for solver in [
            SolverKind::DenseQr,
            SolverKind::SparseCholesky,
            SolverKind::ConjugateGradient,
        ] {
            let options = ReconstructOptions::default()
                .with_source(DeltaSource::Raw)
                .with_solver(solver);
            reconstruct(&mut mesh, &anchors, &options).unwrap();
            assert!(max_error(&mesh) < 1e-8, "{:?}: {}", solver, max_error(&mesh));
        }
    }

    #[test]
    fn test_single_anchor_raw_is_exact() {
        // Exact deltas plus one anchor determine the mesh completely.
        let mut mesh = connected_cube();
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let options = ReconstructOptions::default().with_source(DeltaSource::Raw);
        reconstruct(&mut mesh, &[VertexId::new(3)], &options).unwrap();
        assert!(max_error(&mesh) < 1e-8);
    }

    #[test]
    fn test_solvers_agree_on_quantized() {
        let mut mesh = grid(7);
        compute_laplacian_coordinates(&mut mesh).unwrap();
        quantize_laplacian(&mut mesh, 4).unwrap();
        let anchors = [VertexId::new(0), VertexId::new(24), VertexId::new(48)];

        let qr = ReconstructOptions::default().with_solver(SolverKind::DenseQr);
        reconstruct(&mut mesh, &anchors, &qr).unwrap();
        let a: Vec<Point3<f64>> = mesh.vertices().map(|(_, v)| v.reconstructed).collect();

        let chol = ReconstructOptions::default().with_solver(SolverKind::SparseCholesky);
        reconstruct(&mut mesh, &anchors, &chol).unwrap();
        for ((_, v), p) in mesh.vertices().zip(&a) {
            assert!((v.reconstructed - p).norm() < 1e-9);
        }

        let cg = ReconstructOptions::default().with_solver(SolverKind::ConjugateGradient);
        reconstruct(&mut mesh, &anchors, &cg).unwrap();
        for ((_, v), p) in mesh.vertices().zip(&a) {
            assert!((v.reconstructed - p).norm() < 1e-4);
        }
    }

    #[test]
    fn test_auto_above_dense_limit_is_direct() {
        // An iteration cap of one would fail any iterative solve.
        let mut mesh = grid(30);
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let options = ReconstructOptions::default()
            .with_source(DeltaSource::Raw)
            .with_dense_limit(10)
            .with_max_iterations(1)
            .with_tolerance(1e-14);
        reconstruct(&mut mesh, &[VertexId::new(0)], &options).unwrap();
        assert!(max_error(&mesh) < 1e-6, "{}", max_error(&mesh));
    }

    #[test]
    fn test_large_block_is_direct() {
        let mut mesh = grid(25);
        let all: Vec<VertexId> = mesh.vertex_ids().collect();
        let options = ReconstructOptions::default()
            .with_source(DeltaSource::Raw)
            .with_dense_limit(100)
            .with_max_iterations(1);
        let blocks =
            block_least_squares(&mut mesh, &[all], &[VertexId::new(312)], 12, &options).unwrap();
        assert_eq!(blocks[0].size, 625);
        assert!(max_error(&mesh) < 1e-6, "{}", max_error(&mesh));
    }

    #[test]
    fn test_original_positions_untouched() {
        let mut mesh = connected_cube();
        compute_laplacian_coordinates(&mut mesh).unwrap();
        quantize_laplacian(&mut mesh, 2).unwrap();
        let before: Vec<Point3<f64>> = mesh.vertices().map(|(_, v)| v.position).collect();
        reconstruct(&mut mesh, &[VertexId::new(0)], &ReconstructOptions::default()).unwrap();
        let after: Vec<Point3<f64>> = mesh.vertices().map(|(_, v)| v.position).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_no_anchors() {
        let mut mesh = connected_cube();
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let err = reconstruct(&mut mesh, &[], &ReconstructOptions::default()).unwrap_err();
        assert!(matches!(err, MeshError::Solve(SolveError::NoAnchors)));
    }

    #[test]
    fn test_unanchored_component() {
        let mut mesh = two_components();
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let err = reconstruct(&mut mesh, &[VertexId::new(0)], &ReconstructOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            MeshError::Solve(SolveError::UnanchoredComponent { vertex: 4 })
        ));

        let anchors = [VertexId::new(0), VertexId::new(5)];
        let options = ReconstructOptions::default().with_source(DeltaSource::Raw);
        reconstruct(&mut mesh, &anchors, &options).unwrap();
        assert!(max_error(&mesh) < 1e-8);
    }

    #[test]
    fn test_isolated_vertex() {
        let mut mesh = connected_cube();
        let lonely = mesh.add_vertex(Point3::new(7.0, 7.0, 7.0)).unwrap();
        mesh.compute_all_neighbors();
        compute_laplacian_coordinates(&mut mesh).unwrap();

        let err = reconstruct(&mut mesh, &[VertexId::new(0)], &ReconstructOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            MeshError::Solve(SolveError::IsolatedVertex { vertex }) if vertex == lonely.index()
        ));

        // Anchoring it makes the system solvable.
        let options = ReconstructOptions::default().with_source(DeltaSource::Raw);
        reconstruct(&mut mesh, &[VertexId::new(0), lonely], &options).unwrap();
        assert!((mesh.vertex(lonely).reconstructed - Point3::new(7.0, 7.0, 7.0)).norm() < 1e-9);
    }

    #[test]
    fn test_not_converged_surfaces() {
        let mut mesh = grid(10);
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let options = ReconstructOptions::default()
            .with_source(DeltaSource::Raw)
            .with_solver(SolverKind::ConjugateGradient)
            .with_max_iterations(1)
            .with_tolerance(1e-14);
        let err = reconstruct(&mut mesh, &[VertexId::new(0)], &options).unwrap_err();
        assert!(matches!(err, MeshError::Solve(SolveError::NotConverged { .. })));
    }

    #[test]
    fn test_invalid_weight() {
        let mut mesh = connected_cube();
        let options = ReconstructOptions::default().with_anchor_weight(0.0);
        let err = reconstruct(&mut mesh, &[VertexId::new(0)], &options).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { name: "anchor_weight", .. }));
    }

    #[test]
    fn test_system_shape() {
        let mut mesh = connected_cube();
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let anchors = [VertexId::new(0), VertexId::new(6)];
        let system = LaplacianSystem::assemble(&mesh, &anchors, &ReconstructOptions::default()).unwrap();
        assert_eq!(system.matrix().nrows(), 10);
        assert_eq!(system.matrix().ncols(), 8);
        // Each Laplacian row sums to zero.
        for i in 0..8 {
            let s: f64 = system.matrix().row(i).map(|(_, v)| v).sum();
            assert!(s.abs() < 1e-12);
        }
        assert_eq!(system.rhs(0)[9], mesh.position(VertexId::new(6)).x);
    }

    #[test]
    fn test_block_least_squares_raw_exact() {
        let mut mesh = grid(6);
        let ids: Vec<VertexId> = mesh.vertex_ids().collect();
        let (left, right): (Vec<VertexId>, Vec<VertexId>) =
            ids.iter().partition(|v| mesh.position(**v).x < 0.5);
        let segments = vec![left, right];

        let options = ReconstructOptions::default().with_source(DeltaSource::Raw);
        let blocks = block_least_squares(&mut mesh, &segments, &[], 8, &options).unwrap();

        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.seed_anchor.is_some()));
        assert!(max_error(&mesh) < 1e-8);
    }

    #[test]
    fn test_block_least_squares_uses_block_anchors() {
        let mut mesh = grid(6);
        compute_laplacian_coordinates(&mut mesh).unwrap();
        let all: Vec<VertexId> = mesh.vertex_ids().collect();
        let anchors = [VertexId::new(7), VertexId::new(30)];

        let blocks = block_least_squares(
            &mut mesh,
            &[all],
            &anchors,
            6,
            &ReconstructOptions::default(),
        )
        .unwrap();
        assert_eq!(blocks[0].anchors, 2);
        assert!(blocks[0].seed_anchor.is_none());
        assert!(max_error(&mesh) < 0.5);
    }

    #[test]
    fn test_block_least_squares_missing_vertex() {
        let mut mesh = grid(4);
        let partial: Vec<VertexId> = mesh.vertex_ids().skip(1).collect();
        let err = block_least_squares(&mut mesh, &[partial], &[], 8, &ReconstructOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            MeshError::Solve(SolveError::UnanchoredComponent { vertex: 0 })
        ));
    }
}
