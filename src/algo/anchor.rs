//! Anchor selection.
//!
//! Anchors are the vertices whose positions are transmitted exactly and pinned
//! during reconstruction. Two strategies are provided:
//!
//! - **Greedy**: start from a seed and repeatedly add the vertex with the
//!   largest reconstruction error. One full solve per added anchor.
//! - **BFS layering**: label every vertex with its hop distance to the nearest
//!   anchor and keep adding the farthest vertex until every vertex lies within
//!   a depth threshold.
//!
//! # Example
//!
//! ```
//! use lapmesh::algo::anchor::{seed_anchor, select_anchors_bfs, BfsAnchorOptions};
//! use lapmesh::algo::laplacian::{compute_laplacian_coordinates, quantize_laplacian};
//! use lapmesh::mesh::{build_from_triangles, Mesh};
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
//! quantize_laplacian(&mut mesh, 10).unwrap();
//!
//! let seed = seed_anchor(&mesh).unwrap();
//! let result = select_anchors_bfs(&mesh, seed, 1, &BfsAnchorOptions::default()).unwrap();
//! assert_eq!(result.anchors, vec![seed]);
//! ```

use std::marker::PhantomData;

use log::{debug, info, warn};

use super::reconstruct::{reconstruct_warm, ReconstructOptions, Solution};
use super::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, MeshIndex, VertexId};

/// The vertex with the largest quantized Laplacian magnitude.
///
/// Ties go to the lowest id. `None` for an empty mesh.
pub fn seed_anchor<I: MeshIndex>(mesh: &Mesh<I>) -> Option<VertexId<I>> {
    let mut best: Option<(VertexId<I>, f64)> = None;
    for (v, vertex) in mesh.vertices() {
        let magnitude = vertex.quantized_laplacian.norm();
        match best {
            Some((_, m)) if magnitude <= m => {}
            _ => best = Some((v, magnitude)),
        }
    }
    best.map(|(v, _)| v)
}

// ============================================================================
// Greedy selection
// ============================================================================

/// Options for greedy anchor selection.
#[derive(Debug, Clone)]
pub struct GreedyOptions {
    /// Options for each intermediate reconstruction.
    pub reconstruct: ReconstructOptions,

    /// Start each solve from the previous solution (default: true).
    ///
    /// Only the conjugate gradient solver makes use of it.
    pub warm_start: bool,
}

impl Default for GreedyOptions {
    fn default() -> Self {
        Self {
            reconstruct: ReconstructOptions::default(),
            warm_start: true,
        }
    }
}

impl GreedyOptions {
    /// Set the reconstruction options.
    pub fn with_reconstruct(mut self, reconstruct: ReconstructOptions) -> Self {
        self.reconstruct = reconstruct;
        self
    }

    /// Set whether solves are warm-started.
    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }
}

/// Result of greedy anchor selection.
#[derive(Debug, Clone)]
pub struct GreedyAnchors<I: MeshIndex = u32> {
    /// Anchors in the order they were chosen, seed first.
    pub anchors: Vec<VertexId<I>>,

    /// Mq after each solve; the last entry is for the full anchor set.
    pub history: Vec<f64>,

    /// Smallest Mq seen.
    pub best_error: f64,
}

/// Select `count` anchors beyond the seed by repeatedly adding the vertex
/// with the largest reconstruction error.
///
/// Requires current neighbors and quantized Laplacian coordinates. On return
/// the mesh holds the reconstruction for the final anchor set. Stops early
/// once every vertex is an anchor.
pub fn greedy_anchors<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    count: usize,
    options: &GreedyOptions,
) -> Result<GreedyAnchors<I>> {
    greedy_anchors_with_progress(mesh, count, options, &Progress::none())
}

/// Greedy anchor selection with progress reporting.
pub fn greedy_anchors_with_progress<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    count: usize,
    options: &GreedyOptions,
    progress: &Progress,
) -> Result<GreedyAnchors<I>> {
    let seed = seed_anchor(mesh).ok_or(MeshError::EmptyMesh)?;

    let mut anchors = vec![seed];
    let mut is_anchor = vec![false; mesh.vertex_slots()];
    is_anchor[seed.index()] = true;

    let mut history = Vec::with_capacity(count + 1);
    let mut warm: Option<Solution> = None;

    for step in 0..count {
        progress.report(step, count, "Greedy anchor selection");

        let solution = reconstruct_warm(mesh, &anchors, &options.reconstruct, warm.as_ref())?;
        let mut total = 0.0;
        let mut worst: Option<(VertexId<I>, f64)> = None;
        for (v, vertex) in mesh.vertices() {
            let err = (vertex.reconstructed - vertex.position).norm_squared();
            total += err;
            if is_anchor[v.index()] {
                continue;
            }
            match worst {
                Some((_, e)) if err <= e => {}
                _ => worst = Some((v, err)),
            }
        }
        history.push(total.sqrt());

        let Some((next, err)) = worst else {
            debug!("every vertex is anchored after {} steps", step);
            break;
        };
        debug!("step {}: Mq {:.6e}, adding {:?} (error {:.3e})", step, total.sqrt(), next, err);
        anchors.push(next);
        is_anchor[next.index()] = true;
        if options.warm_start {
            warm = Some(solution);
        }
    }

    reconstruct_warm(mesh, &anchors, &options.reconstruct, warm.as_ref())?;
    let total: f64 = mesh
        .vertices()
        .map(|(_, vertex)| (vertex.reconstructed - vertex.position).norm_squared())
        .sum();
    history.push(total.sqrt());
    progress.report(count, count, "Greedy anchor selection");

    let best_error = history.iter().copied().fold(f64::INFINITY, f64::min);
    info!(
        "greedy selection: {} anchors, final Mq {:.6e}",
        anchors.len(),
        total.sqrt()
    );

    Ok(GreedyAnchors {
        anchors,
        history,
        best_error,
    })
}

// ============================================================================
// BFS layering
// ============================================================================

/// Hop distance from each vertex to the nearest seed of the BFS passes run so far.
#[derive(Debug, Clone)]
pub struct DistanceField<I: MeshIndex = u32> {
    distances: Vec<usize>,
    _marker: PhantomData<I>,
}

impl<I: MeshIndex> DistanceField<I> {
    /// Distance of a vertex no pass has reached.
    pub const UNREACHED: usize = usize::MAX;

    /// A field with every vertex unreached.
    pub fn new(mesh: &Mesh<I>) -> Self {
        Self {
            distances: vec![Self::UNREACHED; mesh.vertex_slots()],
            _marker: PhantomData,
        }
    }

    /// Recorded distance of `v`.
    #[inline]
    pub fn distance(&self, v: VertexId<I>) -> usize {
        self.distances[v.index()]
    }

    /// Whether some pass has reached `v`.
    #[inline]
    pub fn is_reached(&self, v: VertexId<I>) -> bool {
        self.distance(v) != Self::UNREACHED
    }

    /// Live vertex with the largest distance, unreached counting as largest.
    ///
    /// Ties go to the lowest id.
    pub fn farthest(&self, mesh: &Mesh<I>) -> Option<(VertexId<I>, usize)> {
        let mut best: Option<(VertexId<I>, usize)> = None;
        for v in mesh.vertex_ids() {
            let d = self.distance(v);
            match best {
                Some((_, bd)) if d <= bd => {}
                _ => best = Some((v, d)),
            }
        }
        best
    }
}

/// Breadth-first pass from `seed`, lowering each reached vertex's distance to
/// its layer if that is smaller.
///
/// Distances never increase. Vertices outside the seed's component keep their
/// previous value. Returns the number of vertices reached.
pub fn bfs_pass<I: MeshIndex>(
    mesh: &Mesh<I>,
    field: &mut DistanceField<I>,
    seed: VertexId<I>,
) -> usize {
    let mut visited = vec![false; mesh.vertex_slots()];
    let mut layer = vec![seed];
    visited[seed.index()] = true;
    let mut depth = 0usize;
    let mut reached = 0usize;

    while !layer.is_empty() {
        let mut next = Vec::new();
        for &v in &layer {
            let slot = &mut field.distances[v.index()];
            *slot = (*slot).min(depth);
            reached += 1;
            for &n in mesh.neighbors(v) {
                if !visited[n.index()] {
                    visited[n.index()] = true;
                    next.push(n);
                }
            }
        }
        layer = next;
        depth += 1;
    }
    reached
}

/// Options for BFS anchor selection.
#[derive(Debug, Clone)]
pub struct BfsAnchorOptions {
    /// Maximum number of BFS passes (default: 10000).
    pub max_rounds: usize,
}

impl Default for BfsAnchorOptions {
    fn default() -> Self {
        Self { max_rounds: 10_000 }
    }
}

impl BfsAnchorOptions {
    /// Set the pass limit.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }
}

/// Result of BFS anchor selection.
#[derive(Debug, Clone)]
pub struct BfsAnchors<I: MeshIndex = u32> {
    /// Vertices at distance zero, in id order.
    pub anchors: Vec<VertexId<I>>,
    /// Final distance field.
    pub distances: DistanceField<I>,
    /// Number of BFS passes run.
    pub rounds: usize,
    /// Largest remaining distance.
    pub max_distance: usize,
}

/// Grow an anchor set until every vertex is within `depth_threshold` hops of one.
///
/// After each pass the farthest vertex (unreached vertices first, ties to
/// the lowest id) seeds the next pass while its distance exceeds the
/// threshold. Disconnected components each receive an anchor this way.
/// Requires current neighbors.
pub fn select_anchors_bfs<I: MeshIndex>(
    mesh: &Mesh<I>,
    seed: VertexId<I>,
    depth_threshold: usize,
    options: &BfsAnchorOptions,
) -> Result<BfsAnchors<I>> {
    mesh.require_neighbors()?;
    if mesh.try_vertex(seed).is_none() {
        return Err(MeshError::MissingElement {
            kind: "vertex",
            index: seed.index(),
        });
    }
    if options.max_rounds == 0 {
        return Err(MeshError::invalid_param(
            "max_rounds",
            options.max_rounds,
            "must be at least 1",
        ));
    }

    let mut field = DistanceField::new(mesh);
    let mut current = seed;
    let mut rounds = 0usize;
    let mut max_distance;

    loop {
        let reached = bfs_pass(mesh, &mut field, current);
        rounds += 1;
        debug!("BFS pass {} from {:?} reached {} vertices", rounds, current, reached);

        // The seed was just labeled, so the mesh has at least one vertex.
        let (far, distance) = field.farthest(mesh).unwrap_or((current, 0));
        max_distance = distance;
        if distance <= depth_threshold {
            break;
        }
        if rounds >= options.max_rounds {
            warn!(
                "stopped after {} BFS passes with a vertex at distance {}",
                rounds,
                if distance == DistanceField::<I>::UNREACHED {
                    "unreached".to_string()
                } else {
                    distance.to_string()
                }
            );
            break;
        }
        current = far;
    }

    let anchors: Vec<VertexId<I>> = mesh
        .vertex_ids()
        .filter(|&v| field.distance(v) == 0)
        .collect();
    info!(
        "BFS selection: {} anchors in {} passes (threshold {})",
        anchors.len(),
        rounds,
        depth_threshold
    );

    Ok(BfsAnchors {
        anchors,
        distances: field,
        rounds,
        max_distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::laplacian::{compute_laplacian_coordinates, quantize_laplacian};
    use crate::algo::reconstruct::{reconstruct, DeltaSource};
    use crate::test_util::{connected_cube, grid, tetrahedron, two_components};

    fn prepared_grid(n: usize, bits: u32) -> Mesh {
        let mut mesh = grid(n);
        compute_laplacian_coordinates(&mut mesh).unwrap();
        quantize_laplacian(&mut mesh, bits).unwrap();
        mesh
    }

    #[test]
    fn test_seed_is_largest_delta() {
        let mesh = prepared_grid(5, 12);
        let seed = seed_anchor(&mesh).unwrap();
        let best = mesh
            .vertices()
            .map(|(_, v)| v.quantized_laplacian.norm())
            .fold(0.0, f64::max);
        assert_eq!(mesh.vertex(seed).quantized_laplacian.norm(), best);
    }

    #[test]
    fn test_seed_ties_lowest_id() {
        let mesh = connected_cube();
        // Nothing computed yet: every magnitude is zero.
        assert_eq!(seed_anchor(&mesh), Some(VertexId::new(0)));
        assert_eq!(seed_anchor(&Mesh::<u32>::new()), None);
    }

    #[test]
    fn test_greedy_adds_worst_vertex() {
        let mut mesh = prepared_grid(6, 6);
        let seed = seed_anchor(&mesh).unwrap();

        reconstruct(&mut mesh, &[seed], &ReconstructOptions::default()).unwrap();
        let mut worst = (seed, -1.0);
        for (v, vertex) in mesh.vertices() {
            let err = (vertex.reconstructed - vertex.position).norm_squared();
            if v != seed && err > worst.1 {
                worst = (v, err);
            }
        }

        let result = greedy_anchors(&mut mesh, 3, &GreedyOptions::default()).unwrap();
        assert_eq!(result.anchors.len(), 4);
        assert_eq!(result.anchors[0], seed);
        assert_eq!(result.anchors[1], worst.0);
        assert_eq!(result.history.len(), 4);

        let mut sorted = result.anchors.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);

        let min = result.history.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_error, min);
    }

    #[test]
    fn test_greedy_stops_when_all_anchored() {
        let mut mesh = tetrahedron();
        mesh.create_edges_from_triangles().unwrap();
        mesh.compute_all_neighbors();
        compute_laplacian_coordinates(&mut mesh).unwrap();
        quantize_laplacian(&mut mesh, 8).unwrap();

        let options = GreedyOptions::default()
            .with_reconstruct(ReconstructOptions::default().with_source(DeltaSource::Raw));
        let result = greedy_anchors(&mut mesh, 10, &options).unwrap();
        assert_eq!(result.anchors.len(), 4);
        assert!(*result.history.last().unwrap() < 1e-8);
    }

    #[test]
    fn test_greedy_empty_mesh() {
        let mut mesh: Mesh = Mesh::new();
        assert!(matches!(
            greedy_anchors(&mut mesh, 1, &GreedyOptions::default()),
            Err(MeshError::EmptyMesh)
        ));
    }

    #[test]
    fn test_bfs_pass_layers() {
        let mesh = grid(4);
        let mut field = DistanceField::new(&mesh);
        let reached = bfs_pass(&mesh, &mut field, VertexId::new(0));
        assert_eq!(reached, 16);
        assert_eq!(field.distance(VertexId::new(0)), 0);
        assert_eq!(field.distance(VertexId::new(1)), 1);
        // The diagonal edge makes (1, 1) a direct neighbor of the corner.
        assert_eq!(field.distance(VertexId::new(5)), 1);
        assert_eq!(field.distance(VertexId::new(15)), 3);
    }

    #[test]
    fn test_bfs_monotone() {
        let mesh = grid(6);
        let mut field = DistanceField::new(&mesh);
        let mut previous: Vec<usize> = mesh.vertex_ids().map(|v| field.distance(v)).collect();

        for seed in [0, 35, 17, 5] {
            bfs_pass(&mesh, &mut field, VertexId::new(seed));
            let current: Vec<usize> = mesh.vertex_ids().map(|v| field.distance(v)).collect();
            for (before, after) in previous.iter().zip(&current) {
                assert!(after <= before);
            }
            previous = current;
        }
    }

    #[test]
    fn test_select_bfs_threshold() {
        let mesh = grid(8);
        let result =
            select_anchors_bfs(&mesh, VertexId::new(0), 2, &BfsAnchorOptions::default()).unwrap();
        assert!(result.anchors.contains(&VertexId::new(0)));
        assert!(result.anchors.len() > 1);
        assert!(result.max_distance <= 2);
        for v in mesh.vertex_ids() {
            assert!(result.distances.distance(v) <= 2);
        }
        assert_eq!(result.rounds, result.anchors.len());
    }

    #[test]
    fn test_select_bfs_disconnected() {
        let mesh = two_components();
        let result =
            select_anchors_bfs(&mesh, VertexId::new(0), 5, &BfsAnchorOptions::default()).unwrap();
        assert_eq!(result.anchors, vec![VertexId::new(0), VertexId::new(4)]);
        assert_eq!(result.max_distance, 1);
    }

    #[test]
    fn test_select_bfs_round_limit() {
        let mesh = grid(8);
        let options = BfsAnchorOptions::default().with_max_rounds(1);
        let result = select_anchors_bfs(&mesh, VertexId::new(0), 0, &options).unwrap();
        assert_eq!(result.rounds, 1);
        assert_eq!(result.anchors, vec![VertexId::new(0)]);
        assert!(result.max_distance > 0);
    }
}
