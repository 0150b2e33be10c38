//! End-to-end Laplacian compression of a mesh.
//!
//! [`compress`] runs the stages in order:
//!
//! 1. build edges (if the mesh has none) and adjacency lists
//! 2. compute and quantize Laplacian coordinates
//! 3. select anchors, greedily or by BFS layering
//! 4. reconstruct, globally or block by block
//! 5. measure the reconstruction
//!
//! The mesh is left holding its reconstruction in each vertex's
//! `reconstructed` field.
//!
//! # Example
//!
//! ```
//! use lapmesh::algo::pipeline::{compress, AnchorStrategy, CompressionOptions};
//! use lapmesh::algo::Progress;
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
//!
//! let options = CompressionOptions::default()
//!     .with_bits(10)
//!     .with_strategy(AnchorStrategy::Greedy { count: 1 });
//! let report = compress(&mut mesh, &options, &Progress::none()).unwrap();
//! assert_eq!(report.anchors.len(), 2);
//! ```

use log::info;

use super::anchor::{
    greedy_anchors_with_progress, seed_anchor, select_anchors_bfs, BfsAnchorOptions,
    GreedyOptions,
};
use super::laplacian::{compute_laplacian_coordinates, quantize_laplacian, Quantizer};
use super::metrics::{evaluate, MetricsOptions, QualityReport};
use super::reconstruct::{block_least_squares, reconstruct, BlockSummary, ReconstructOptions};
use super::segment::{greedy_packet, segment_mesh, Packets, SegmentOptions, Segmentation};
use super::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, MeshIndex, VertexId};

/// How anchors are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorStrategy {
    /// Add `count` maximum-error vertices after the seed.
    Greedy {
        /// Number of anchors added after the seed.
        count: usize,
    },
    /// Add farthest vertices until all are within `depth_threshold` hops.
    Bfs {
        /// Largest allowed hop distance to an anchor.
        depth_threshold: usize,
    },
}

impl Default for AnchorStrategy {
    fn default() -> Self {
        AnchorStrategy::Greedy { count: 10 }
    }
}

/// How the reconstruction system is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveMode {
    /// One system for the whole mesh.
    #[default]
    Global,
    /// One system per segment.
    Blockwise,
}

/// Options for [`compress`].
#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Quantization bits per axis (default: 12).
    pub bits: u32,

    /// Anchor selection strategy (default: greedy with 10 anchors).
    pub strategy: AnchorStrategy,

    /// Solve mode (default: global).
    pub mode: SolveMode,

    /// Warm-start greedy solves (default: true).
    pub warm_start: bool,

    /// Reconstruction solver options.
    pub reconstruct: ReconstructOptions,

    /// BFS selection options.
    pub bfs: BfsAnchorOptions,

    /// Segmentation options for block-wise solves.
    pub segment: SegmentOptions,

    /// Metric options.
    pub metrics: MetricsOptions,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            bits: 12,
            strategy: AnchorStrategy::default(),
            mode: SolveMode::default(),
            warm_start: true,
            reconstruct: ReconstructOptions::default(),
            bfs: BfsAnchorOptions::default(),
            segment: SegmentOptions::default(),
            metrics: MetricsOptions::default(),
        }
    }
}

impl CompressionOptions {
    /// Set the quantization bits.
    pub fn with_bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    /// Set the anchor strategy.
    pub fn with_strategy(mut self, strategy: AnchorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the solve mode.
    pub fn with_mode(mut self, mode: SolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set whether greedy solves are warm-started.
    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    /// Set the reconstruction options.
    pub fn with_reconstruct(mut self, reconstruct: ReconstructOptions) -> Self {
        self.reconstruct = reconstruct;
        self
    }

    /// Set the BFS selection options.
    pub fn with_bfs(mut self, bfs: BfsAnchorOptions) -> Self {
        self.bfs = bfs;
        self
    }

    /// Set the segmentation options.
    pub fn with_segment(mut self, segment: SegmentOptions) -> Self {
        self.segment = segment;
        self
    }

    /// Set the metric options.
    pub fn with_metrics(mut self, metrics: MetricsOptions) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Everything [`compress`] produced.
#[derive(Debug, Clone)]
pub struct CompressionReport<I: MeshIndex = u32> {
    /// Quantizer fitted to the whole mesh.
    pub quantizer: Quantizer,
    /// Chosen anchors.
    pub anchors: Vec<VertexId<I>>,
    /// Block seeds pinned to their true position because their block held
    /// no anchor (block-wise solves only).
    pub pinned: Vec<VertexId<I>>,
    /// Mq after each greedy solve (empty for BFS selection).
    pub greedy_history: Vec<f64>,
    /// BFS passes run (zero for greedy selection).
    pub bfs_rounds: usize,
    /// Segments used by a block-wise solve.
    pub segmentation: Option<Segmentation<I>>,
    /// Packet assignment of a block-wise solve.
    pub packets: Option<Packets<I>>,
    /// Per-block summaries of a block-wise solve.
    pub blocks: Vec<BlockSummary<I>>,
    /// Reconstruction quality.
    pub quality: QualityReport<I>,
}

impl<I: MeshIndex> CompressionReport<I> {
    /// Number of vertices whose exact position the reconstruction consumed.
    pub fn exact_positions(&self) -> usize {
        self.anchors.len() + self.pinned.len()
    }
}

const STAGES: usize = 5;

/// Compress `mesh` and measure the reconstruction.
pub fn compress<I: MeshIndex>(
    mesh: &mut Mesh<I>,
    options: &CompressionOptions,
    progress: &Progress,
) -> Result<CompressionReport<I>> {
    if mesh.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    progress.report(0, STAGES, "Building adjacency");
    if mesh.num_edges() == 0 && mesh.num_triangles() > 0 {
        let created = mesh.create_edges_from_triangles()?;
        info!("created {} edges from {} triangles", created, mesh.num_triangles());
    }
    mesh.refresh_neighbors();

    progress.report(1, STAGES, "Quantizing Laplacian coordinates");
    compute_laplacian_coordinates(mesh)?;
    let quantizer = quantize_laplacian(mesh, options.bits)?;

    progress.report(2, STAGES, "Selecting anchors");
    let mut greedy_history = Vec::new();
    let mut bfs_rounds = 0;
    let anchors = match options.strategy {
        AnchorStrategy::Greedy { count } => {
            let greedy = GreedyOptions::default()
                .with_reconstruct(options.reconstruct.clone())
                .with_warm_start(options.warm_start);
            let result = greedy_anchors_with_progress(mesh, count, &greedy, progress)?;
            greedy_history = result.history;
            result.anchors
        }
        AnchorStrategy::Bfs { depth_threshold } => {
            let seed = seed_anchor(mesh).ok_or(MeshError::EmptyMesh)?;
            let result = select_anchors_bfs(mesh, seed, depth_threshold, &options.bfs)?;
            bfs_rounds = result.rounds;
            result.anchors
        }
    };

    progress.report(3, STAGES, "Reconstructing");
    let mut segmentation = None;
    let mut packets = None;
    let mut blocks: Vec<BlockSummary<I>> = Vec::new();
    match options.mode {
        SolveMode::Global => {
            // Greedy selection already leaves the final reconstruction in place.
            if matches!(options.strategy, AnchorStrategy::Bfs { .. }) {
                reconstruct(mesh, &anchors, &options.reconstruct)?;
            }
        }
        SolveMode::Blockwise => {
            let seg = segment_mesh(mesh, &options.segment)?;
            let assigned = greedy_packet(mesh, &seg, options.segment.packet_size)?;
            blocks = block_least_squares(
                mesh,
                seg.segments(),
                &anchors,
                options.bits,
                &options.reconstruct,
            )?;
            segmentation = Some(seg);
            packets = Some(assigned);
        }
    }

    let pinned: Vec<VertexId<I>> = blocks.iter().filter_map(|b| b.seed_anchor).collect();

    progress.report(4, STAGES, "Measuring");
    let quality = evaluate(mesh, &options.metrics)?;
    progress.report(STAGES, STAGES, "Done");

    info!(
        "compressed {} vertices with {} anchors ({} pinned block seeds): Mq {:.6e}, Sq {:.6e}, Evis {:.6e}, Hausdorff {:.6e}",
        mesh.num_vertices(),
        anchors.len(),
        pinned.len(),
        quality.mq,
        quality.sq,
        quality.evis,
        quality.hausdorff
    );

    Ok(CompressionReport {
        quantizer,
        anchors,
        pinned,
        greedy_history,
        bfs_rounds,
        segmentation,
        packets,
        blocks,
        quality,
    })
}
